//! The Core IR expression tree.
//!
//! Core is the typed functional intermediate representation produced by the
//! front end: lambdas, applications, lets, and multi-scrutinee pattern
//! matches, with explicit type abstraction and application. Transformation
//! passes consume a [`Module`] and return a rewritten one; the tree itself
//! is plain owned data.
//!
//! Statements do not exist as a separate form — they are encoded as `let`
//! bindings of anonymous names (see [`Expr::maybe_stats`]), the same way an
//! `if` is encoded as a `case` over the `bool` constructors
//! ([`Expr::make_if`]).

use rustc_hash::FxHashSet;

use crate::name::{Name, TName};
use crate::newtypes::ConRepr;
use crate::ty::{Ty, TypeVar};

// ── Literals ────────────────────────────────────────────────────────

/// A literal constant. Floats are stored as raw bits so the tree stays
/// `Eq`/`Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lit {
    Int(i64),
    Float(u64),
    Char(char),
    Str(Box<str>),
}

impl Lit {
    /// The type of the literal.
    pub fn ty(&self) -> Ty {
        match self {
            Lit::Int(_) => Ty::type_int(),
            Lit::Float(_) => Ty::type_float(),
            Lit::Char(_) => Ty::type_char(),
            Lit::Str(_) => Ty::type_string(),
        }
    }
}

// ── Variable info ───────────────────────────────────────────────────

/// How a variable occurrence refers to its target.
///
/// Only `VarInfo::None` occurrences denote reference-counted values.
/// `Arity` marks a reference used solely for direct calls of a known
/// top-level function; `External` carries the literal C template the code
/// generator splices for an externally-implemented primitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VarInfo {
    None,
    Arity { type_params: u32, params: u32 },
    External(Box<str>),
}

// ── Expressions ─────────────────────────────────────────────────────

/// A Core expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// Value lambda.
    Lam { params: Vec<TName>, body: Box<Expr> },
    /// Variable occurrence.
    Var { name: TName, info: VarInfo },
    /// Application.
    App { fun: Box<Expr>, args: Vec<Expr> },
    /// Type abstraction.
    TypeLam { params: Vec<TypeVar>, body: Box<Expr> },
    /// Type application.
    TypeApp { expr: Box<Expr>, args: Vec<Ty> },
    /// Constructor reference.
    Con { name: TName, repr: ConRepr },
    /// Literal.
    Lit(Lit),
    /// Let with a sequence of definition groups.
    Let { groups: Vec<DefGroup>, body: Box<Expr> },
    /// Pattern match over one or more scrutinees.
    Case { scruts: Vec<Expr>, branches: Vec<Branch> },
}

impl Expr {
    /// A plain (reference-counted) variable occurrence.
    pub fn var(name: TName) -> Expr {
        Expr::Var {
            name,
            info: VarInfo::None,
        }
    }

    pub fn lam(params: Vec<TName>, body: Expr) -> Expr {
        Expr::Lam {
            params,
            body: Box::new(body),
        }
    }

    pub fn app(fun: Expr, args: Vec<Expr>) -> Expr {
        Expr::App {
            fun: Box::new(fun),
            args,
        }
    }

    /// A `let` over `groups`; collapses to `body` when `groups` is empty.
    pub fn make_let(groups: Vec<DefGroup>, body: Expr) -> Expr {
        if groups.is_empty() {
            body
        } else {
            Expr::Let {
                groups,
                body: Box::new(body),
            }
        }
    }

    /// Sequence side-effecting statements before `body` by binding each to
    /// an anonymous name. No statements means `body` unchanged.
    pub fn maybe_stats(stats: Vec<Expr>, body: Expr) -> Expr {
        let groups = stats
            .into_iter()
            .map(|stat| DefGroup::NonRec(Def::anon(stat)))
            .collect();
        Expr::make_let(groups, body)
    }

    /// `if cond then on_true else on_false`, encoded as a `case` over the
    /// `bool` constructors.
    pub fn make_if(cond: Expr, on_true: Expr, on_false: Expr) -> Expr {
        Expr::Case {
            scruts: vec![cond],
            branches: vec![
                Branch::new(
                    vec![Pattern::Con {
                        name: Expr::tname_true(),
                        repr: ConRepr::value(Name::qualified("core/types", "bool")),
                        args: vec![],
                    }],
                    vec![Guard::unconditional(on_true)],
                ),
                Branch::new(vec![Pattern::Wild], vec![Guard::unconditional(on_false)]),
            ],
        }
    }

    fn tname_true() -> TName {
        TName::new(Name::qualified("core/types", "True"), Ty::type_bool())
    }

    /// The `True` constructor.
    pub fn con_true() -> Expr {
        Expr::Con {
            name: Expr::tname_true(),
            repr: ConRepr::value(Name::qualified("core/types", "bool")),
        }
    }

    /// The `()` constructor.
    pub fn con_unit() -> Expr {
        Expr::Con {
            name: TName::new(Name::qualified("core/types", "Unit"), Ty::type_unit()),
            repr: ConRepr::value(Name::qualified("core/types", "unit")),
        }
    }

    /// The type of the expression. Core is typed throughout, so this is a
    /// structural read-off, not inference.
    pub fn ty(&self) -> Ty {
        match self {
            Expr::Lam { params, body } => {
                Ty::fun(params.iter().map(|p| p.ty.clone()).collect(), body.ty())
            }
            Expr::Var { name, .. } => name.ty.clone(),
            Expr::App { fun, .. } => result_type(&fun.ty()),
            Expr::TypeLam { params, body } => {
                Ty::Forall(params.clone(), Box::new(body.ty()))
            }
            Expr::TypeApp { expr, args } => expr.ty().instantiate(args),
            Expr::Con { name, .. } => name.ty.clone(),
            Expr::Lit(lit) => lit.ty(),
            Expr::Let { body, .. } => body.ty(),
            Expr::Case { branches, .. } => branches
                .first()
                .and_then(|b| b.guards.first())
                .map_or_else(Ty::type_unit, |g| g.body.ty()),
        }
    }
}

/// The result type of applying a function of type `fun_ty`.
fn result_type(fun_ty: &Ty) -> Ty {
    match fun_ty {
        Ty::Fun(_, result) => (**result).clone(),
        Ty::Forall(_, body) => result_type(body),
        other => other.clone(),
    }
}

// ── Definitions ─────────────────────────────────────────────────────

/// A single named binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Def {
    pub name: Name,
    pub ty: Ty,
    pub body: Expr,
}

impl Def {
    pub fn new(name: Name, ty: Ty, body: Expr) -> Self {
        Def { name, ty, body }
    }

    /// An anonymous binding used for statement sequencing.
    pub fn anon(body: Expr) -> Self {
        Def {
            name: Name::nil(),
            ty: body.ty(),
            body,
        }
    }

    /// The typed name this definition binds.
    pub fn tname(&self) -> TName {
        TName::new(self.name.clone(), self.ty.clone())
    }
}

/// A definition group: a single non-recursive binding or a mutually
/// recursive cluster. Source order is preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefGroup {
    NonRec(Def),
    Rec(Vec<Def>),
}

/// A compilation unit: the top-level definition groups of one module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    pub name: Name,
    pub def_groups: Vec<DefGroup>,
}

// ── Pattern matching ────────────────────────────────────────────────

/// One alternative of a `case`: a pattern per scrutinee and one or more
/// guards tried in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub patterns: Vec<Pattern>,
    pub guards: Vec<Guard>,
}

impl Branch {
    pub fn new(patterns: Vec<Pattern>, guards: Vec<Guard>) -> Self {
        Branch { patterns, guards }
    }

    /// All variables bound by this branch's patterns.
    pub fn bound(&self) -> FxHashSet<TName> {
        let mut bound = FxHashSet::default();
        for pattern in &self.patterns {
            pattern.collect_bound(&mut bound);
        }
        bound
    }
}

/// A guard: `test` must evaluate to `True` for `body` to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guard {
    pub test: Expr,
    pub body: Expr,
}

impl Guard {
    pub fn new(test: Expr, body: Expr) -> Self {
        Guard { test, body }
    }

    /// A guard that always succeeds.
    pub fn unconditional(body: Expr) -> Self {
        Guard {
            test: Expr::con_true(),
            body,
        }
    }
}

/// A pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Constructor match with sub-patterns per field.
    Con {
        name: TName,
        repr: ConRepr,
        args: Vec<Pattern>,
    },
    /// Bind a name, then match the wrapped pattern.
    Var { binder: TName, pattern: Box<Pattern> },
    /// Literal match.
    Lit(Lit),
    /// Match anything, bind nothing.
    Wild,
}

impl Pattern {
    /// Bind a variable over a wildcard — how constructor fields are named.
    pub fn bind(binder: TName) -> Pattern {
        Pattern::Var {
            binder,
            pattern: Box::new(Pattern::Wild),
        }
    }

    fn collect_bound(&self, bound: &mut FxHashSet<TName>) {
        match self {
            Pattern::Con { args, .. } => {
                for arg in args {
                    arg.collect_bound(bound);
                }
            }
            Pattern::Var { binder, pattern } => {
                bound.insert(binder.clone());
                pattern.collect_bound(bound);
            }
            Pattern::Lit(_) | Pattern::Wild => {}
        }
    }
}
