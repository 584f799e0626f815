//! End-to-end tests for the reference-counting rewrite.
//!
//! The first group pins the rewrite of small canonical programs as exact
//! trees; the second checks the mechanical properties every rewrite must
//! satisfy (disabled idempotence, no traffic for value types, qualified
//! exclusion, fatal structural errors).

use pretty_assertions::assert_eq;

use keel_core::{
    Branch, Def, DefGroup, Expr, Guard, Lit, Module, Name, Pattern, TName, Ty, Uniq, VarInfo,
};

use crate::prim;
use crate::state::{Live, Parc};
use crate::test_helpers::{
    branch, cons_con, cons_pattern, count_drops, count_dups, extern_fun, global_fun, list_int,
    list_of, nil_pattern, nonrec, registry, var,
};
use crate::transform::parc_expr;
use crate::{parc_module, ParcErrorKind, ParcOptions, TypeClassifier};

/// Run the rewrite on a closed expression.
fn run(expr: Expr) -> Expr {
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let mut parc = Parc::new(&newtypes, &mut uniq);
    parc_expr(&mut parc, expr).unwrap()
}

/// Run the rewrite with `owned` pre-owned, returning the result and the
/// final live set.
fn run_owned(owned: &[&TName], expr: Expr) -> (Expr, Live) {
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let mut parc = Parc::new(&newtypes, &mut uniq);
    let owned: Live = owned.iter().map(|n| (*n).clone()).collect();
    parc.isolate_with(Live::default(), |parc| {
        parc.extend_owned(owned, |parc| parc_expr(parc, expr))
    })
    .unwrap()
}

fn dup_of(name: &TName) -> Expr {
    let newtypes = registry();
    let cls = TypeClassifier::new(&newtypes);
    prim::gen_dup(&cls, name).unwrap().expect("type is counted")
}

fn drop_of(name: &TName) -> Expr {
    let newtypes = registry();
    let cls = TypeClassifier::new(&newtypes);
    prim::gen_drop(&cls, name).unwrap().expect("type is counted")
}

// ── Pinned rewrites ─────────────────────────────────────────────────

#[test]
fn identity_on_machine_int_is_untouched() {
    // fn(x: int) x — nothing is counted.
    let x = TName::local("x", Ty::type_int());
    let lam = Expr::lam(vec![x.clone()], var(&x));
    assert_eq!(run(lam.clone()), lam);
}

#[test]
fn identity_on_counted_list_is_untouched() {
    // fn(x: list<int>) x — the parameter moves out; no dup, no drop.
    let x = TName::local("x", list_int());
    let lam = Expr::lam(vec![x.clone()], var(&x));
    assert_eq!(run(lam.clone()), lam);
}

#[test]
fn dead_counted_parameter_is_dropped_at_entry() {
    // fn(x: list<int>) 0  ⇒  fn(x) { drop(x); 0 }
    let x = TName::local("x", list_int());
    let lam = Expr::lam(vec![x.clone()], Expr::Lit(Lit::Int(0)));
    let expected = Expr::lam(
        vec![x.clone()],
        Expr::maybe_stats(vec![drop_of(&x)], Expr::Lit(Lit::Int(0))),
    );
    assert_eq!(run(lam), expected);
}

#[test]
fn dead_parameters_drop_in_name_order() {
    let a = TName::local("a", list_int());
    let b = TName::local("b", list_int());
    let lam = Expr::lam(vec![a.clone(), b.clone()], Expr::Lit(Lit::Int(0)));
    let expected = Expr::lam(
        vec![a.clone(), b.clone()],
        Expr::maybe_stats(vec![drop_of(&a), drop_of(&b)], Expr::Lit(Lit::Int(0))),
    );
    assert_eq!(run(lam), expected);
}

#[test]
fn earlier_use_dups_last_use_moves() {
    // fn(x) f(x, x) — the rightmost x is the last use and moves; the
    // leftmost is needed again downstream and dups.
    let x = TName::local("x", list_int());
    let f = extern_fun("f", vec![list_int(), list_int()], list_int());
    let lam = Expr::lam(
        vec![x.clone()],
        Expr::app(f.clone(), vec![var(&x), var(&x)]),
    );
    let expected = Expr::lam(
        vec![x.clone()],
        Expr::app(f, vec![dup_of(&x), var(&x)]),
    );
    assert_eq!(run(lam), expected);
}

#[test]
fn case_normalizes_scrutinee_and_branches_drop_their_dead() {
    // match mk-list() { Cons(h, t) -> h | Nil -> fallback }
    //
    // The scrutinee is bound to a fresh name; in the Cons branch the dead
    // tail drops and each branch releases the scrutinee it does not use.
    let h = TName::local("h", Ty::type_int());
    let t = TName::local("t", list_int());
    let mk = global_fun("mk-list", vec![], list_int());
    let scrut = Expr::app(mk, vec![]);
    let fallback = Expr::Var {
        name: TName::new(Name::qualified("demo", "fallback"), Ty::type_int()),
        info: VarInfo::None,
    };
    let case = Expr::Case {
        scruts: vec![scrut.clone()],
        branches: vec![
            branch(vec![cons_pattern(Ty::type_int(), &h, &t)], var(&h)),
            branch(vec![nil_pattern(Ty::type_int())], fallback.clone()),
        ],
    };

    let match0 = TName::local("match0", list_int());
    let expected = Expr::Let {
        groups: vec![DefGroup::NonRec(Def::new(
            match0.name.clone(),
            list_int(),
            scrut,
        ))],
        body: Box::new(Expr::Case {
            scruts: vec![var(&match0)],
            branches: vec![
                Branch::new(
                    vec![cons_pattern(Ty::type_int(), &h, &t)],
                    vec![Guard::unconditional(Expr::maybe_stats(
                        vec![drop_of(&t), drop_of(&match0)],
                        var(&h),
                    ))],
                ),
                Branch::new(
                    vec![nil_pattern(Ty::type_int())],
                    vec![Guard::unconditional(Expr::maybe_stats(
                        vec![drop_of(&match0)],
                        fallback,
                    ))],
                ),
            ],
        }),
    };
    assert_eq!(run(case), expected);
}

#[test]
fn let_rebinding_dups_all_but_the_last_use() {
    // let y = x in Pair(y, y) — the second y moves, the first dups, and x
    // moves into the binding; only x stays live for the enclosing scope.
    let x = TName::local("x", list_int());
    let y = TName::local("y", list_int());
    let pair_ty = Ty::Con(Name::qualified("demo", "pair"));
    let pair = Expr::Con {
        name: TName::new(
            Name::qualified("demo", "Pair"),
            Ty::fun(vec![list_int(), list_int()], pair_ty),
        ),
        repr: keel_core::ConRepr::heap(Name::qualified("demo", "pair")),
    };
    let expr = Expr::Let {
        groups: vec![DefGroup::NonRec(Def::new(
            y.name.clone(),
            y.ty.clone(),
            var(&x),
        ))],
        body: Box::new(Expr::app(pair.clone(), vec![var(&y), var(&y)])),
    };

    let (result, live) = run_owned(&[&x], expr);

    let expected = Expr::Let {
        groups: vec![DefGroup::NonRec(Def::new(
            y.name.clone(),
            y.ty.clone(),
            var(&x),
        ))],
        body: Box::new(Expr::app(pair, vec![dup_of(&y), var(&y)])),
    };
    assert_eq!(result, expected);
    assert_eq!(live, [x].into_iter().collect());
}

#[test]
fn dead_let_binding_is_dropped_after_binding() {
    // let y = x in 0 ⇒ let y = x in { drop(y); 0 }
    let x = TName::local("x", list_int());
    let y = TName::local("y", list_int());
    let expr = Expr::Let {
        groups: vec![DefGroup::NonRec(Def::new(
            y.name.clone(),
            y.ty.clone(),
            var(&x),
        ))],
        body: Box::new(Expr::Lit(Lit::Int(0))),
    };

    let (result, _) = run_owned(&[&x], expr);

    let expected = Expr::Let {
        groups: vec![DefGroup::NonRec(Def::new(
            y.name.clone(),
            y.ty.clone(),
            var(&x),
        ))],
        body: Box::new(Expr::maybe_stats(vec![drop_of(&y)], Expr::Lit(Lit::Int(0)))),
    };
    assert_eq!(result, expected);
}

#[test]
fn guard_entry_dup_for_a_consumed_counted_pattern_variable() {
    // match xss { Cons(h, t) if is-empty(h) -> h | Nil -> fallback }
    // with h itself a counted list. The body consumes h, so the guard
    // entry retains it; the test only borrows it, so its occurrence dups.
    let xss = TName::local("xss", list_of(list_int()));
    let h = TName::local("h", list_int());
    let t = TName::local("t", list_of(list_int()));
    let is_empty = global_fun("is-empty", vec![list_int()], Ty::type_bool());
    let fallback = Expr::Var {
        name: TName::new(Name::qualified("demo", "fallback"), list_int()),
        info: VarInfo::None,
    };
    let case = Expr::Case {
        scruts: vec![var(&xss)],
        branches: vec![
            Branch::new(
                vec![cons_pattern(list_int(), &h, &t)],
                vec![Guard::new(
                    Expr::app(is_empty.clone(), vec![var(&h)]),
                    var(&h),
                )],
            ),
            branch(vec![nil_pattern(list_int())], fallback.clone()),
        ],
    };

    let (result, live) = run_owned(&[&xss], case);

    let expected = Expr::Case {
        scruts: vec![var(&xss)],
        branches: vec![
            Branch::new(
                vec![cons_pattern(list_int(), &h, &t)],
                vec![Guard::new(
                    Expr::app(is_empty, vec![dup_of(&h)]),
                    Expr::maybe_stats(
                        vec![dup_of(&h), drop_of(&t), drop_of(&xss)],
                        var(&h),
                    ),
                )],
            ),
            Branch::new(
                vec![nil_pattern(list_int())],
                vec![Guard::unconditional(Expr::maybe_stats(
                    vec![drop_of(&xss)],
                    fallback,
                ))],
            ),
        ],
    };
    assert_eq!(result, expected);
    assert_eq!(live, [xss].into_iter().collect());
}

// ── Lambda captures ─────────────────────────────────────────────────

#[test]
fn borrowed_capture_is_retained_at_construction() {
    // fn(y: int) Cons(y, xs) with xs not owned here: the closure owns its
    // capture, so construction retains xs.
    let xs = TName::local("xs", list_int());
    let y = TName::local("y", Ty::type_int());
    let lam = Expr::lam(
        vec![y.clone()],
        Expr::app(cons_con(Ty::type_int()), vec![var(&y), var(&xs)]),
    );
    let expected = Expr::maybe_stats(vec![dup_of(&xs)], lam.clone());
    assert_eq!(run(lam), expected);
}

#[test]
fn owned_capture_is_retained_at_construction_too() {
    // Construction retains every capture unconditionally; the reference
    // the scope owns stays with the scope (nothing downstream needs xs,
    // so the binder that owns it releases it later).
    let xs = TName::local("xs", list_int());
    let y = TName::local("y", Ty::type_int());
    let lam = Expr::lam(
        vec![y.clone()],
        Expr::app(cons_con(Ty::type_int()), vec![var(&y), var(&xs)]),
    );
    let (result, live) = run_owned(&[&xs], lam.clone());
    assert_eq!(result, Expr::maybe_stats(vec![dup_of(&xs)], lam));
    // One capture, one dup in the outer scope.
    assert_eq!(count_dups(&result), 1);
    assert!(live.is_empty());
}

#[test]
fn capture_used_before_the_closure_still_dups_at_construction() {
    // f(xs, fn(y) Cons(y, xs)) — the closure retains its capture at
    // construction; the earlier argument occurrence is then the last
    // owned use and moves.
    let xs = TName::local("xs", list_int());
    let y = TName::local("y", Ty::type_int());
    let closure = Expr::lam(
        vec![y.clone()],
        Expr::app(cons_con(Ty::type_int()), vec![var(&y), var(&xs)]),
    );
    let closure_ty = Ty::fun(vec![Ty::type_int()], list_int());
    let f = extern_fun("consume", vec![list_int(), closure_ty], list_int());
    let expr = Expr::app(f.clone(), vec![var(&xs), closure.clone()]);

    let (result, live) = run_owned(&[&xs], expr);

    let expected = Expr::app(
        f,
        vec![var(&xs), Expr::maybe_stats(vec![dup_of(&xs)], closure)],
    );
    assert_eq!(result, expected);
    assert_eq!(count_dups(&result), 1);
    assert_eq!(live, [xs].into_iter().collect());
}

// ── Mechanical properties ───────────────────────────────────────────

#[test]
fn disabled_pass_returns_the_input_unchanged() {
    let x = TName::local("x", list_int());
    let module = Module {
        name: Name::qualified("demo", "main"),
        def_groups: vec![nonrec(
            "discard",
            Ty::fun(vec![list_int()], Ty::type_int()),
            Expr::lam(vec![x], Expr::Lit(Lit::Int(0))),
        )],
    };
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let out = parc_module(
        module.clone(),
        &newtypes,
        &mut uniq,
        &ParcOptions::disabled(),
    )
    .unwrap();
    assert_eq!(out, module);
}

#[test]
fn module_rewrite_keeps_the_top_level_shape() {
    let x = TName::local("x", list_int());
    let n = TName::local("n", Ty::type_int());
    let module = Module {
        name: Name::qualified("demo", "main"),
        def_groups: vec![
            nonrec(
                "discard",
                Ty::fun(vec![list_int()], Ty::type_int()),
                Expr::lam(vec![x.clone()], Expr::Lit(Lit::Int(0))),
            ),
            nonrec(
                "id-int",
                Ty::fun(vec![Ty::type_int()], Ty::type_int()),
                Expr::lam(vec![n.clone()], var(&n)),
            ),
        ],
    };
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let out = parc_module(module.clone(), &newtypes, &mut uniq, &ParcOptions::enabled())
        .unwrap();

    assert_eq!(out.name, module.name);
    assert_eq!(out.def_groups.len(), 2);
    // Group order and names survive; only bodies change.
    let DefGroup::NonRec(first) = &out.def_groups[0] else {
        panic!("expected a non-recursive group");
    };
    assert_eq!(first.name, Name::qualified("demo", "discard"));
    assert_eq!(
        first.body,
        Expr::lam(
            vec![x.clone()],
            Expr::maybe_stats(vec![drop_of(&x)], Expr::Lit(Lit::Int(0)))
        )
    );
    let DefGroup::NonRec(second) = &out.def_groups[1] else {
        panic!("expected a non-recursive group");
    };
    assert_eq!(second.body, Expr::lam(vec![n.clone()], var(&n)));
}

#[test]
fn value_types_generate_no_traffic() {
    // fn(n: int) g(n, n) — two uses, zero dups, zero drops.
    let n = TName::local("n", Ty::type_int());
    let g = global_fun("g", vec![Ty::type_int(), Ty::type_int()], Ty::type_int());
    let lam = Expr::lam(vec![n.clone()], Expr::app(g, vec![var(&n), var(&n)]));
    let out = run(lam.clone());
    assert_eq!(out, lam);
    assert_eq!(count_dups(&out), 0);
    assert_eq!(count_drops(&out), 0);
}

#[test]
fn qualified_names_generate_no_traffic() {
    // A top-level value used twice: globals are not counted by this pass.
    let shared = Expr::Var {
        name: TName::new(Name::qualified("demo", "shared"), list_int()),
        info: VarInfo::None,
    };
    let f = extern_fun("f", vec![list_int(), list_int()], list_int());
    let expr = Expr::app(f, vec![shared.clone(), shared]);
    let out = run(expr.clone());
    assert_eq!(out, expr);
    assert_eq!(count_dups(&out), 0);
    assert_eq!(count_drops(&out), 0);
}

#[test]
fn shape_is_preserved_at_the_top_of_every_rewrite() {
    let x = TName::local("x", list_int());

    // Lambda stays a lambda.
    assert!(matches!(
        run(Expr::lam(vec![x.clone()], Expr::Lit(Lit::Int(0)))),
        Expr::Lam { .. }
    ));

    // A let stays a let.
    let y = TName::local("y", list_int());
    let (out, _) = run_owned(
        &[&x],
        Expr::Let {
            groups: vec![DefGroup::NonRec(Def::new(
                y.name.clone(),
                y.ty.clone(),
                var(&x),
            ))],
            body: Box::new(var(&y)),
        },
    );
    assert!(matches!(out, Expr::Let { .. }));

    // A normalized case stays a case; a non-normalized one gains a let.
    let (out, _) = run_owned(
        &[&x],
        Expr::Case {
            scruts: vec![var(&x)],
            branches: vec![branch(vec![Pattern::Wild], Expr::Lit(Lit::Int(0)))],
        },
    );
    assert!(matches!(out, Expr::Case { .. }));

    let mk = global_fun("mk-list", vec![], list_int());
    let out = run(Expr::Case {
        scruts: vec![Expr::app(mk, vec![])],
        branches: vec![branch(vec![Pattern::Wild], Expr::Lit(Lit::Int(0)))],
    });
    assert!(matches!(out, Expr::Let { .. }));
}

// ── Fatal structural errors ─────────────────────────────────────────

#[test]
fn recursive_let_at_expression_level_is_fatal() {
    let f = TName::local("f", Ty::fun(vec![Ty::type_int()], Ty::type_int()));
    let expr = Expr::Let {
        groups: vec![DefGroup::Rec(vec![Def::new(
            f.name.clone(),
            f.ty.clone(),
            var(&f),
        )])],
        body: Box::new(Expr::Lit(Lit::Int(0))),
    };
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let mut parc = Parc::new(&newtypes, &mut uniq);
    let err = parc_expr(&mut parc, expr).unwrap_err();
    assert_eq!(err.kind, ParcErrorKind::RecursiveLet);
}

#[test]
fn unknown_type_constructor_is_fatal_and_names_the_definition() {
    let mystery = Ty::Con(Name::qualified("demo", "mystery"));
    let x = TName::local("x", mystery);
    let module = Module {
        name: Name::qualified("demo", "main"),
        def_groups: vec![nonrec(
            "broken",
            Ty::fun(vec![x.ty.clone()], Ty::type_int()),
            Expr::lam(vec![x], Expr::Lit(Lit::Int(0))),
        )],
    };
    let newtypes = registry();
    let mut uniq = Uniq::new();
    let err = parc_module(module, &newtypes, &mut uniq, &ParcOptions::enabled()).unwrap_err();
    assert_eq!(
        err.kind,
        ParcErrorKind::UnknownTypeCon {
            con: Name::qualified("demo", "mystery")
        }
    );
    assert_eq!(err.def_chain, vec![Name::qualified("demo", "broken")]);
}
