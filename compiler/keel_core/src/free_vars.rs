//! Free-variable computation over Core expressions.
//!
//! Collects the free *local* variables of an expression: unqualified
//! occurrences with [`VarInfo::None`] that are not bound by an enclosing
//! lambda parameter, `let` binding, or pattern. Qualified names are global
//! and never count as free locals.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::expr::{DefGroup, Expr, VarInfo};
use crate::name::TName;

/// The free local variables of `expr`.
pub fn free_locals(expr: &Expr) -> FxHashSet<TName> {
    let mut walker = FreeVars::default();
    walker.visit(expr);
    walker.free
}

#[derive(Default)]
struct FreeVars {
    free: FxHashSet<TName>,
    /// Binder scopes, innermost last.
    scopes: SmallVec<[FxHashSet<TName>; 8]>,
}

impl FreeVars {
    fn is_bound(&self, name: &TName) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn in_scope(&mut self, vars: FxHashSet<TName>, f: impl FnOnce(&mut Self)) {
        self.scopes.push(vars);
        f(self);
        self.scopes.pop();
    }

    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Lam { params, body } => {
                let scope = params.iter().cloned().collect();
                self.in_scope(scope, |s| s.visit(body));
            }
            Expr::Var { name, info } => {
                if *info == VarInfo::None && !name.is_qualified() && !self.is_bound(name) {
                    self.free.insert(name.clone());
                }
            }
            Expr::App { fun, args } => {
                self.visit(fun);
                for arg in args {
                    self.visit(arg);
                }
            }
            Expr::TypeLam { body, .. } => self.visit(body),
            Expr::TypeApp { expr, .. } => self.visit(expr),
            Expr::Con { .. } | Expr::Lit(_) => {}
            Expr::Let { groups, body } => self.visit_let(groups, body),
            Expr::Case { scruts, branches } => {
                for scrut in scruts {
                    self.visit(scrut);
                }
                for branch in branches {
                    self.in_scope(branch.bound(), |s| {
                        for guard in &branch.guards {
                            s.visit(&guard.test);
                            s.visit(&guard.body);
                        }
                    });
                }
            }
        }
    }

    fn visit_let(&mut self, groups: &[DefGroup], body: &Expr) {
        match groups.split_first() {
            None => self.visit(body),
            Some((DefGroup::NonRec(def), rest)) => {
                self.visit(&def.body);
                let scope = [def.tname()].into_iter().collect();
                self.in_scope(scope, |s| s.visit_let(rest, body));
            }
            Some((DefGroup::Rec(defs), rest)) => {
                let scope: FxHashSet<TName> = defs.iter().map(|d| d.tname()).collect();
                self.in_scope(scope, |s| {
                    for def in defs {
                        s.visit(&def.body);
                    }
                    s.visit_let(rest, body);
                });
            }
        }
    }
}
