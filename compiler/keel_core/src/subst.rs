//! Variable substitution over Core expressions.
//!
//! Replaces plain variable occurrences by expressions, respecting scope: a
//! binder for a substituted name stops the substitution underneath it. Used
//! by case normalization, where hoisted pattern binders are rewritten to
//! scrutinee variables inside the branch guards.

use rustc_hash::FxHashMap;

use crate::expr::{Branch, Def, DefGroup, Expr, Guard, VarInfo};
use crate::name::TName;

/// Apply `sub` to `expr`.
pub fn subst_vars(expr: &Expr, sub: &FxHashMap<TName, Expr>) -> Expr {
    if sub.is_empty() {
        return expr.clone();
    }
    match expr {
        Expr::Lam { params, body } => {
            let inner = without(sub, params.iter());
            Expr::Lam {
                params: params.clone(),
                body: Box::new(subst_vars(body, inner.as_ref().unwrap_or(sub))),
            }
        }
        Expr::Var { name, info } => {
            if *info == VarInfo::None {
                if let Some(replacement) = sub.get(name) {
                    return replacement.clone();
                }
            }
            expr.clone()
        }
        Expr::App { fun, args } => Expr::App {
            fun: Box::new(subst_vars(fun, sub)),
            args: args.iter().map(|arg| subst_vars(arg, sub)).collect(),
        },
        Expr::TypeLam { params, body } => Expr::TypeLam {
            params: params.clone(),
            body: Box::new(subst_vars(body, sub)),
        },
        Expr::TypeApp { expr, args } => Expr::TypeApp {
            expr: Box::new(subst_vars(expr, sub)),
            args: args.clone(),
        },
        Expr::Con { .. } | Expr::Lit(_) => expr.clone(),
        Expr::Let { groups, body } => subst_let(groups, body, sub),
        Expr::Case { scruts, branches } => Expr::Case {
            scruts: scruts.iter().map(|scrut| subst_vars(scrut, sub)).collect(),
            branches: branches.iter().map(|b| subst_branch(b, sub)).collect(),
        },
    }
}

fn subst_branch(branch: &Branch, sub: &FxHashMap<TName, Expr>) -> Branch {
    let bound = branch.bound();
    let inner = without(sub, bound.iter());
    let sub = inner.as_ref().unwrap_or(sub);
    Branch {
        patterns: branch.patterns.clone(),
        guards: branch
            .guards
            .iter()
            .map(|guard| Guard {
                test: subst_vars(&guard.test, sub),
                body: subst_vars(&guard.body, sub),
            })
            .collect(),
    }
}

/// Substitute through a `let`, narrowing the substitution as each group
/// brings its binders into scope. The group structure is preserved exactly.
fn subst_let(groups: &[DefGroup], body: &Expr, sub: &FxHashMap<TName, Expr>) -> Expr {
    let mut sub = sub.clone();
    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        match group {
            DefGroup::NonRec(def) => {
                let def_out = Def {
                    name: def.name.clone(),
                    ty: def.ty.clone(),
                    body: subst_vars(&def.body, &sub),
                };
                sub.remove(&def.tname());
                out.push(DefGroup::NonRec(def_out));
            }
            DefGroup::Rec(defs) => {
                // Recursive binders scope over their own bodies.
                for def in defs {
                    sub.remove(&def.tname());
                }
                out.push(DefGroup::Rec(
                    defs.iter()
                        .map(|def| Def {
                            name: def.name.clone(),
                            ty: def.ty.clone(),
                            body: subst_vars(&def.body, &sub),
                        })
                        .collect(),
                ));
            }
        }
    }
    Expr::Let {
        groups: out,
        body: Box::new(subst_vars(body, &sub)),
    }
}

/// `sub` minus the given binders; `None` when nothing is shadowed (so the
/// caller can keep using the original map without cloning).
fn without<'a>(
    sub: &FxHashMap<TName, Expr>,
    binders: impl Iterator<Item = &'a TName> + Clone,
) -> Option<FxHashMap<TName, Expr>> {
    if binders.clone().any(|b| sub.contains_key(b)) {
        let mut filtered = sub.clone();
        for binder in binders {
            filtered.remove(binder);
        }
        Some(filtered)
    } else {
        None
    }
}
