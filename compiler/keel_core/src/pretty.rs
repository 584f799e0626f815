//! Compact rendering of Core trees.
//!
//! One-line, parenthesized output meant for trace events and test failure
//! messages, not for users.

use std::fmt;

use crate::expr::{Branch, Def, DefGroup, Expr, Guard, Lit, Module, Pattern, VarInfo};
use crate::ty::Ty;

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Int(i) => write!(f, "{i}"),
            Lit::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Lit::Char(c) => write!(f, "{c:?}"),
            Lit::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Con(name) => write!(f, "{name}"),
            Ty::Var(v) => write!(f, "'{}", v.0),
            Ty::Fun(params, result) => {
                write!(f, "(")?;
                join(f, params, ", ")?;
                write!(f, ") -> {result}")
            }
            Ty::App(head, args) => {
                write!(f, "{head}<")?;
                join(f, args, ", ")?;
                write!(f, ">")
            }
            Ty::Forall(vars, body) => {
                write!(f, "forall<")?;
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}", v.0)?;
                }
                write!(f, "> {body}")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lam { params, body } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") {body}")
            }
            Expr::Var { name, info } => match info {
                VarInfo::None => write!(f, "{name}"),
                VarInfo::Arity { .. } => write!(f, "{name}#"),
                VarInfo::External(_) => write!(f, "{name}!"),
            },
            Expr::App { fun, args } => {
                write!(f, "{fun}(")?;
                join(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::TypeLam { body, .. } => write!(f, "/\\. {body}"),
            Expr::TypeApp { expr, .. } => write!(f, "{expr}@"),
            Expr::Con { name, .. } => write!(f, "{name}"),
            Expr::Lit(lit) => write!(f, "{lit}"),
            Expr::Let { groups, body } => {
                for group in groups {
                    write!(f, "{group} ")?;
                }
                write!(f, "in {body}")
            }
            Expr::Case { scruts, branches } => {
                write!(f, "match (")?;
                join(f, scruts, ", ")?;
                write!(f, ") {{ ")?;
                join(f, branches, " | ")?;
                write!(f, " }}")
            }
        }
    }
}

impl fmt::Display for DefGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefGroup::NonRec(def) => write!(f, "let {def};"),
            DefGroup::Rec(defs) => {
                write!(f, "let rec {{")?;
                join(f, defs, "; ")?;
                write!(f, "}};")
            }
        }
    }
}

impl fmt::Display for Def {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_nil() {
            write!(f, "_ = {}", self.body)
        } else {
            write!(f, "{} = {}", self.name, self.body)
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join(f, &self.patterns, ", ")?;
        for guard in &self.guards {
            write!(f, " {guard}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(&self.test, Expr::Con { name, .. } if name.name.ident() == "True") {
            write!(f, "-> {}", self.body)
        } else {
            write!(f, "if {} -> {}", self.test, self.body)
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Con { name, args, .. } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    join(f, args, ", ")?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Pattern::Var { binder, pattern } => match **pattern {
                Pattern::Wild => write!(f, "{binder}"),
                _ => write!(f, "{binder} as {pattern}"),
            },
            Pattern::Lit(lit) => write!(f, "{lit}"),
            Pattern::Wild => write!(f, "_"),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for group in &self.def_groups {
            writeln!(f, "{group}")?;
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
