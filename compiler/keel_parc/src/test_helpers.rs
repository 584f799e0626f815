//! Shared test utilities for the reference-counting pass.
//!
//! Factory functions for the registry fixture, common types, and Core
//! expressions, plus walkers that count emitted `dup`/`drop` calls. Only
//! compiled in test builds.

use keel_core::{
    Branch, ConRepr, DataInfo, DataRepr, Def, DefGroup, Expr, Guard, Name, Newtypes, Pattern,
    TName, Ty, VarInfo,
};

/// Registry with the types the fixtures use: machine ints (uncounted),
/// cons lists and pairs (counted heap types), unit and bool values.
pub(crate) fn registry() -> Newtypes {
    [
        DataInfo::new(
            Name::qualified("core/types", "int"),
            DataRepr::Value { raw: 1, scan: 0 },
        ),
        DataInfo::new(
            Name::qualified("core/types", "unit"),
            DataRepr::Value { raw: 0, scan: 0 },
        ),
        DataInfo::new(
            Name::qualified("core/types", "bool"),
            DataRepr::Value { raw: 1, scan: 0 },
        ),
        DataInfo::new(Name::qualified("core/types", "list"), DataRepr::Heap),
        DataInfo::new(Name::qualified("demo", "pair"), DataRepr::Heap),
    ]
    .into_iter()
    .collect()
}

pub(crate) fn list_of(elem: Ty) -> Ty {
    Ty::app(Ty::Con(Name::qualified("core/types", "list")), vec![elem])
}

pub(crate) fn list_int() -> Ty {
    list_of(Ty::type_int())
}

/// A local variable occurrence.
pub(crate) fn var(name: &TName) -> Expr {
    Expr::var(name.clone())
}

/// A reference to a known top-level function (arity info, not counted).
pub(crate) fn global_fun(ident: &str, params: Vec<Ty>, result: Ty) -> Expr {
    Expr::Var {
        name: TName::new(
            Name::qualified("demo", ident),
            Ty::fun(params.clone(), result),
        ),
        info: VarInfo::Arity {
            type_params: 0,
            params: params.len() as u32,
        },
    }
}

/// A reference to an externally-implemented function (not counted).
pub(crate) fn extern_fun(ident: &str, params: Vec<Ty>, result: Ty) -> Expr {
    Expr::Var {
        name: TName::new(Name::qualified("demo", ident), Ty::fun(params, result)),
        info: VarInfo::External(format!("{ident}(#1)").into()),
    }
}

/// The `Cons` constructor at element type `elem`.
pub(crate) fn cons_con(elem: Ty) -> Expr {
    Expr::Con {
        name: TName::new(
            Name::qualified("core/types", "Cons"),
            Ty::fun(
                vec![elem.clone(), list_of(elem.clone())],
                list_of(elem),
            ),
        ),
        repr: ConRepr::heap(Name::qualified("core/types", "list")),
    }
}

/// `Cons(head_pat, tail_pat)` at element type `elem`.
pub(crate) fn cons_pattern(elem: Ty, head: &TName, tail: &TName) -> Pattern {
    Pattern::Con {
        name: TName::new(
            Name::qualified("core/types", "Cons"),
            Ty::fun(
                vec![elem.clone(), list_of(elem.clone())],
                list_of(elem),
            ),
        ),
        repr: ConRepr::heap(Name::qualified("core/types", "list")),
        args: vec![Pattern::bind(head.clone()), Pattern::bind(tail.clone())],
    }
}

/// The `Nil` pattern at element type `elem`.
pub(crate) fn nil_pattern(elem: Ty) -> Pattern {
    Pattern::Con {
        name: TName::new(Name::qualified("core/types", "Nil"), list_of(elem)),
        repr: ConRepr::heap(Name::qualified("core/types", "list")),
        args: vec![],
    }
}

/// An unconditional single-guard branch.
pub(crate) fn branch(patterns: Vec<Pattern>, body: Expr) -> Branch {
    Branch::new(patterns, vec![Guard::unconditional(body)])
}

/// A non-recursive top-level definition group.
pub(crate) fn nonrec(ident: &str, ty: Ty, body: Expr) -> DefGroup {
    DefGroup::NonRec(Def::new(Name::qualified("demo", ident), ty, body))
}

// ── Walkers ─────────────────────────────────────────────────────────

/// Visit every expression node in the tree, including definition bodies
/// and branch guards.
pub(crate) fn for_each_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::Lam { body, .. } => for_each_expr(body, f),
        Expr::App { fun, args } => {
            for_each_expr(fun, f);
            for arg in args {
                for_each_expr(arg, f);
            }
        }
        Expr::TypeLam { body, .. } => for_each_expr(body, f),
        Expr::TypeApp { expr, .. } => for_each_expr(expr, f),
        Expr::Let { groups, body } => {
            for group in groups {
                match group {
                    DefGroup::NonRec(def) => for_each_expr(&def.body, f),
                    DefGroup::Rec(defs) => {
                        for def in defs {
                            for_each_expr(&def.body, f);
                        }
                    }
                }
            }
            for_each_expr(body, f);
        }
        Expr::Case { scruts, branches } => {
            for scrut in scruts {
                for_each_expr(scrut, f);
            }
            for b in branches {
                for guard in &b.guards {
                    for_each_expr(&guard.test, f);
                    for_each_expr(&guard.body, f);
                }
            }
        }
        Expr::Var { .. } | Expr::Con { .. } | Expr::Lit(_) => {}
    }
}

/// Count applications of the named `core/types` primitive.
fn count_prim_calls(expr: &Expr, ident: &str) -> usize {
    let mut count = 0;
    for_each_expr(expr, &mut |e| {
        if let Expr::App { fun, .. } = e {
            if let Expr::Var {
                name,
                info: VarInfo::External(_),
            } = &**fun
            {
                if name.name.module() == "core/types" && name.name.ident() == ident {
                    count += 1;
                }
            }
        }
    });
    count
}

pub(crate) fn count_dups(expr: &Expr) -> usize {
    count_prim_calls(expr, "dup")
}

pub(crate) fn count_drops(expr: &Expr) -> usize {
    count_prim_calls(expr, "drop")
}
