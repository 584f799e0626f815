//! Emission of reference-counting primitives as Core syntax.
//!
//! Every primitive is an application of a `Var` whose info carries the
//! literal C template the code generator splices (`dup(#1)`, `drop(#1)`,
//! …). The emitter only constructs syntax; the runtime implements the
//! operations.
//!
//! [`gen_dup`] and [`gen_drop`] return `None` for types that classify as
//! [`RcClass::NoRc`](crate::RcClass::NoRc), which absorbs the common case
//! that machine-word values need no reference-count traffic.
//!
//! The match composites [`gen_drop_match`], [`gen_keep_match`], and
//! [`gen_reuse_match`] package the uniqueness-test protocol around a
//! consumed match scrutinee. They are provided for the constructor-reuse
//! stage; the base transformation does not drive them yet.

use keel_core::{Expr, Name, TName, Ty, VarInfo};

use crate::classify::{TypeClassifier, UnknownTypeCon};
use crate::RcClass;

/// An externally-implemented primitive reference.
fn extern_var(ident: &str, ty: Ty, template: &str) -> Expr {
    Expr::Var {
        name: TName::new(Name::qualified("core/types", ident), ty),
        info: VarInfo::External(template.into()),
    }
}

/// `dup(x)` — retain; evaluates to its argument.
///
/// `None` when `x`'s type needs no reference counting.
pub fn gen_dup(
    cls: &TypeClassifier<'_>,
    name: &TName,
) -> Result<Option<Expr>, UnknownTypeCon> {
    if cls.classify(&name.ty)? == RcClass::NoRc {
        return Ok(None);
    }
    let fun = extern_var(
        "dup",
        Ty::fun(vec![name.ty.clone()], name.ty.clone()),
        "dup(#1)",
    );
    Ok(Some(Expr::app(fun, vec![Expr::var(name.clone())])))
}

/// `drop(x)` — release; evaluates to unit.
///
/// `None` when `x`'s type needs no reference counting.
pub fn gen_drop(
    cls: &TypeClassifier<'_>,
    name: &TName,
) -> Result<Option<Expr>, UnknownTypeCon> {
    if cls.classify(&name.ty)? == RcClass::NoRc {
        return Ok(None);
    }
    let fun = extern_var(
        "drop",
        Ty::fun(vec![name.ty.clone()], Ty::type_unit()),
        "drop(#1)",
    );
    Ok(Some(Expr::app(fun, vec![Expr::var(name.clone())])))
}

/// `is_unique(x)` — `true` when the reference count of `x` is one.
pub fn gen_is_unique(name: &TName) -> Expr {
    let fun = extern_var(
        "is-unique",
        Ty::fun(vec![name.ty.clone()], Ty::type_bool()),
        "constructor_is_unique(#1)",
    );
    Expr::app(fun, vec![Expr::var(name.clone())])
}

/// `free(x)` — release the cell itself without touching its fields.
/// Only valid when `x` is uniquely owned.
pub fn gen_free(name: &TName) -> Expr {
    let fun = extern_var(
        "free",
        Ty::fun(vec![name.ty.clone()], Ty::type_unit()),
        "constructor_free(#1)",
    );
    Expr::app(fun, vec![Expr::var(name.clone())])
}

/// `drop_reuse(x)` — release `x` and hand back its memory as a reuse token.
pub fn gen_drop_reuse(name: &TName) -> Expr {
    let fun = extern_var(
        "drop-reuse",
        Ty::fun(vec![name.ty.clone()], Ty::type_reuse()),
        "drop_reuse_datatype(#1, current_context())",
    );
    Expr::app(fun, vec![Expr::var(name.clone())])
}

/// `no_reuse()` — the empty reuse token.
pub fn gen_no_reuse() -> Expr {
    let fun = Expr::Var {
        name: TName::new(
            Name::qualified("core/types", "no-reuse"),
            Ty::fun(vec![], Ty::type_reuse()),
        ),
        info: VarInfo::Arity {
            type_params: 0,
            params: 0,
        },
    };
    Expr::app(fun, vec![])
}

/// `alloc_at(token, con_app)` — allocate the constructor application in the
/// memory named by the reuse token (or fresh memory for the empty token).
pub fn gen_alloc_at(token: &TName, con_app: Expr) -> Expr {
    let result_ty = con_app.ty();
    let fun = Expr::Var {
        name: TName::new(
            Name::qualified("core/types", "alloc-at"),
            Ty::fun(vec![Ty::type_reuse(), result_ty.clone()], result_ty),
        ),
        info: VarInfo::Arity {
            type_params: 0,
            params: 1,
        },
    };
    Expr::app(fun, vec![Expr::var(token.clone()), con_app])
}

// ── Match composites ────────────────────────────────────────────────
//
// A branch that consumes its scrutinee has two cases at runtime: the cell
// is uniquely owned (steal the fields, release the cell shallowly) or
// shared (retain the fields that escape, decrement the cell). The three
// emitters below build that conditional; choosing between them per match
// site is the constructor-reuse stage's decision.

/// Statement-drops for `dead` plus a statement-dup for every name in
/// `kept`, with `None` (no-RC) entries absorbed.
fn rc_stats(
    cls: &TypeClassifier<'_>,
    kept: &[TName],
    dead: &[TName],
) -> Result<Vec<Expr>, UnknownTypeCon> {
    let mut stats = Vec::new();
    for name in kept {
        if let Some(dup) = gen_dup(cls, name)? {
            stats.push(dup);
        }
    }
    for name in dead {
        if let Some(drop) = gen_drop(cls, name)? {
            stats.push(drop);
        }
    }
    Ok(stats)
}

/// Consume a matched scrutinee: unique cells release dead fields and free
/// the cell shallowly; shared cells retain the kept fields and decrement.
/// Evaluates to unit.
pub fn gen_drop_match(
    cls: &TypeClassifier<'_>,
    scrut: &TName,
    kept: &[TName],
    dead: &[TName],
) -> Result<Expr, UnknownTypeCon> {
    let unique = Expr::maybe_stats(rc_stats(cls, &[], dead)?, gen_free(scrut));
    let shared = Expr::maybe_stats(
        rc_stats(cls, kept, &[])?,
        gen_drop(cls, scrut)?.unwrap_or_else(Expr::con_unit),
    );
    Ok(Expr::make_if(gen_is_unique(scrut), unique, shared))
}

/// Keep a matched scrutinee alive past the branch: the kept fields escape
/// the cell, so each is retained; the cell itself is untouched. Evaluates
/// to unit.
pub fn gen_keep_match(
    cls: &TypeClassifier<'_>,
    kept: &[TName],
) -> Result<Expr, UnknownTypeCon> {
    Ok(Expr::maybe_stats(
        rc_stats(cls, kept, &[])?,
        Expr::con_unit(),
    ))
}

/// Consume a matched scrutinee and recover its memory: like
/// [`gen_drop_match`], but the unique path yields the cell as a reuse
/// token and the shared path yields the empty token. Evaluates to a
/// reuse token.
pub fn gen_reuse_match(
    cls: &TypeClassifier<'_>,
    scrut: &TName,
    kept: &[TName],
    dead: &[TName],
) -> Result<Expr, UnknownTypeCon> {
    let unique = Expr::maybe_stats(rc_stats(cls, &[], dead)?, gen_drop_reuse(scrut));
    let shared_stats = {
        let mut stats = rc_stats(cls, kept, &[])?;
        if let Some(drop) = gen_drop(cls, scrut)? {
            stats.push(drop);
        }
        stats
    };
    let shared = Expr::maybe_stats(shared_stats, gen_no_reuse());
    Ok(Expr::make_if(gen_is_unique(scrut), unique, shared))
}
