//! Case normalization.
//!
//! Branch analysis needs every `case` in a canonical shape:
//!
//! 1. every scrutinee is a plain variable, and
//! 2. no branch pattern is a top-level variable-binding wrapper.
//!
//! Normalization establishes both: non-variable scrutinees are bound to
//! fresh `match<k>` names in a `let` prepended to the `case`, and top-level
//! `Pattern::Var` wrappers are peeled off with the bound name substituted
//! by the scrutinee variable throughout the branch's guards.
//!
//! Scrutinees are visited right-to-left like every other expression list in
//! this pass; the generated bindings are emitted in source order.
//! Normalizing an already-normal `case` returns it unchanged.

use rustc_hash::FxHashMap;

use keel_core::{subst_vars, Branch, Def, DefGroup, Expr, Guard, Pattern, TName, Uniq};

/// Is this `case` already in the canonical shape?
pub fn is_normalized(scruts: &[Expr], branches: &[Branch]) -> bool {
    scruts.iter().all(|s| matches!(s, Expr::Var { .. }))
        && branches.iter().all(|b| {
            b.patterns
                .iter()
                .all(|p| !matches!(p, Pattern::Var { .. }))
        })
}

/// Rewrite a `case` into the canonical shape. The result is the `case`
/// itself, possibly under a `let` binding the former scrutinees.
pub fn normalize_case(uniq: &mut Uniq, scruts: Vec<Expr>, branches: Vec<Branch>) -> Expr {
    let mut scruts = scruts;
    let mut bindings: Vec<Def> = Vec::new();

    // Bind non-variable scrutinees to fresh names, right-to-left.
    for i in (0..scruts.len()).rev() {
        if matches!(scruts[i], Expr::Var { .. }) {
            continue;
        }
        let ty = scruts[i].ty();
        let fresh = uniq.fresh_tname("match", ty.clone());
        let bound = std::mem::replace(&mut scruts[i], Expr::var(fresh.clone()));
        bindings.push(Def::new(fresh.name, ty, bound));
    }
    // Visitation was reversed; bindings go out in source order.
    bindings.reverse();

    let branches = branches
        .into_iter()
        .map(|branch| hoist_binders(branch, &scruts))
        .collect();

    let groups = bindings.into_iter().map(DefGroup::NonRec).collect();
    Expr::make_let(groups, Expr::Case { scruts, branches })
}

/// Peel top-level variable-binding wrappers off a branch's patterns,
/// substituting each hoisted binder by its scrutinee variable in the
/// guards.
fn hoist_binders(branch: Branch, scruts: &[Expr]) -> Branch {
    let mut sub: FxHashMap<TName, Expr> = FxHashMap::default();
    let patterns = branch
        .patterns
        .into_iter()
        .zip(scruts)
        .map(|(pattern, scrut)| {
            let mut pattern = pattern;
            while let Pattern::Var { binder, pattern: inner } = pattern {
                sub.insert(binder, scrut.clone());
                pattern = *inner;
            }
            pattern
        })
        .collect();

    let guards = if sub.is_empty() {
        branch.guards
    } else {
        branch
            .guards
            .iter()
            .map(|guard| Guard {
                test: subst_vars(&guard.test, &sub),
                body: subst_vars(&guard.body, &sub),
            })
            .collect()
    };

    Branch { patterns, guards }
}
