//! Analysis state for the reference-counting transformation.
//!
//! One [`Parc`] value is threaded through the whole traversal of a module.
//! It carries the two working sets of the analysis:
//!
//! - **owned** — names the current enclosing binder has the right to
//!   consume. A read-mostly context: extended on entering a binding scope,
//!   restored on the way out.
//! - **live** — names still needed by the part of the traversal already
//!   visited. The traversal is post-order and right-to-left, so "already
//!   visited" is exactly "evaluated later at runtime". A single mutable
//!   cell, saved and restored by the isolation combinators.
//!
//! Every scoping combinator restores the prior state on both the normal
//! and the error exit path (`std::mem::replace` around the body), so a
//! failed sub-traversal never leaks owned or live entries into its caller.
//!
//! Only unqualified names enter either set: top-level names are globally
//! allocated and not reference-counted by this pass.

use std::fmt;

use rustc_hash::FxHashSet;

use keel_core::{Expr, Name, Newtypes, TName, Uniq};

use crate::classify::{TypeClassifier, UnknownTypeCon};
use crate::prim;

/// A set of live (or owned) names.
pub type Live = FxHashSet<TName>;

// ── Errors ──────────────────────────────────────────────────────────

/// Fatal internal error: the input violated an invariant an earlier stage
/// was supposed to establish, or the analysis contradicted itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParcError {
    pub kind: ParcErrorKind,
    /// Innermost-first chain of definitions being transformed.
    pub def_chain: Vec<Name>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParcErrorKind {
    /// A recursive `let` group at expression level; earlier lowering is
    /// expected to have eliminated these.
    RecursiveLet,
    /// The liveness observed inside a lambda body disagreed with the
    /// free-variable computation.
    CaptureMismatch {
        captures: Vec<TName>,
        live: Vec<TName>,
    },
    /// A type constructor the registry does not know.
    UnknownTypeCon { con: Name },
}

impl fmt::Display for ParcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParcErrorKind::RecursiveLet => {
                write!(f, "parc: recursive let at expression level")?;
            }
            ParcErrorKind::CaptureMismatch { captures, live } => {
                write!(
                    f,
                    "parc: lambda capture/liveness mismatch (captures: {captures:?}, live: {live:?})"
                )?;
            }
            ParcErrorKind::UnknownTypeCon { con } => {
                write!(f, "parc: unknown type constructor `{con}`")?;
            }
        }
        if !self.def_chain.is_empty() {
            write!(f, " in ")?;
            for (i, name) in self.def_chain.iter().enumerate() {
                if i > 0 {
                    write!(f, " < ")?;
                }
                write!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParcError {}

// ── Analysis state ──────────────────────────────────────────────────

/// The traversal context of the reference-counting pass.
pub struct Parc<'a> {
    classifier: TypeClassifier<'a>,
    uniq: &'a mut Uniq,
    owned: Live,
    live: Live,
    /// Definitions currently being transformed, outermost first. Error
    /// messages and trace events name this chain.
    current_def: Vec<Name>,
}

impl<'a> Parc<'a> {
    pub fn new(newtypes: &'a Newtypes, uniq: &'a mut Uniq) -> Self {
        Parc {
            classifier: TypeClassifier::new(newtypes),
            uniq,
            owned: Live::default(),
            live: Live::default(),
            current_def: Vec::new(),
        }
    }

    /// The fresh-name counter.
    pub fn uniq(&mut self) -> &mut Uniq {
        self.uniq
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn is_owned(&self, name: &TName) -> bool {
        self.owned.contains(name)
    }

    pub fn is_live(&self, name: &TName) -> bool {
        self.live.contains(name)
    }

    pub fn is_dead(&self, name: &TName) -> bool {
        !self.is_live(name)
    }

    pub fn live_snapshot(&self) -> Live {
        self.live.clone()
    }

    pub fn owned_snapshot(&self) -> Live {
        self.owned.clone()
    }

    // ── Liveness updates ────────────────────────────────────────

    /// Mark a name live. Qualified names are global and never tracked.
    pub fn mark_live(&mut self, name: &TName) {
        if !name.is_qualified() {
            self.live.insert(name.clone());
        }
    }

    pub fn mark_lives<'n>(&mut self, names: impl IntoIterator<Item = &'n TName>) {
        for name in names {
            self.mark_live(name);
        }
    }

    /// Remove names from the live set on leaving their binding scope.
    pub fn forget(&mut self, names: &Live) {
        for name in names {
            self.live.remove(name);
        }
    }

    // ── Scoped mutation ─────────────────────────────────────────

    /// Run `f` with the owned set replaced by `owned`.
    pub fn with_owned<T>(
        &mut self,
        owned: Live,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<T, ParcError> {
        let saved = std::mem::replace(&mut self.owned, owned);
        let result = f(self);
        self.owned = saved;
        result
    }

    /// Run `f` with the owned set extended by `vars`.
    pub fn extend_owned<T>(
        &mut self,
        vars: Live,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<T, ParcError> {
        let extended = self.owned.union(&vars).cloned().collect();
        self.with_owned(extended, f)
    }

    /// [`extend_owned`](Parc::extend_owned), then forget `vars` from the
    /// live set once `f` is done.
    pub fn scoped<T>(
        &mut self,
        vars: Live,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<T, ParcError> {
        let result = self.extend_owned(vars.clone(), f);
        self.forget(&vars);
        result
    }

    /// Run `f` against the current live set, capture the resulting live
    /// set, and restore the caller's. For analyzing a sibling that must
    /// not influence the caller's liveness.
    pub fn isolated<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<(T, Live), ParcError> {
        let entry = self.live.clone();
        self.isolate_with(entry, f)
    }

    /// [`isolated`](Parc::isolated), discarding the captured live set.
    pub fn isolated_<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<T, ParcError> {
        self.isolated(f).map(|(result, _)| result)
    }

    /// Run `f` with the live set replaced by `live`; return the result
    /// together with the live set `f` produced, restoring the caller's.
    pub fn isolate_with<T>(
        &mut self,
        live: Live,
        f: impl FnOnce(&mut Self) -> Result<T, ParcError>,
    ) -> Result<(T, Live), ParcError> {
        let saved = std::mem::replace(&mut self.live, live);
        let result = f(self);
        let after = std::mem::replace(&mut self.live, saved);
        result.map(|value| (value, after))
    }

    /// Give `f` ownership of `vars`, then release every one of them that
    /// `f` left dead by prepending drops to the produced expression.
    /// `vars` are forgotten afterwards. This is the shared discipline for
    /// lambda parameters and `let` bindings.
    pub fn owned_in_scope(
        &mut self,
        vars: Live,
        f: impl FnOnce(&mut Self) -> Result<Expr, ParcError>,
    ) -> Result<Expr, ParcError> {
        self.scoped(vars.clone(), |parc| {
            let expr = f(parc)?;
            let mut dead: Vec<&TName> = vars.iter().filter(|v| parc.is_dead(v)).collect();
            dead.sort();
            let mut drops = Vec::with_capacity(dead.len());
            for name in dead {
                if let Some(drop) = parc.gen_drop(name)? {
                    drops.push(drop);
                }
            }
            Ok(Expr::maybe_stats(drops, expr))
        })
    }

    // ── Definition chain ────────────────────────────────────────

    pub fn push_current_def(&mut self, name: Name) {
        self.current_def.push(name);
    }

    pub fn pop_current_def(&mut self) {
        self.current_def.pop();
    }

    /// Build a fatal error carrying the current definition chain.
    pub fn error(&self, kind: ParcErrorKind) -> ParcError {
        ParcError {
            kind,
            def_chain: self.current_def.iter().rev().cloned().collect(),
        }
    }

    // ── Primitive emission ──────────────────────────────────────

    pub fn gen_dup(&self, name: &TName) -> Result<Option<Expr>, ParcError> {
        prim::gen_dup(&self.classifier, name).map_err(|e| self.registry_error(e))
    }

    pub fn gen_drop(&self, name: &TName) -> Result<Option<Expr>, ParcError> {
        prim::gen_drop(&self.classifier, name).map_err(|e| self.registry_error(e))
    }

    fn registry_error(&self, err: UnknownTypeCon) -> ParcError {
        self.error(ParcErrorKind::UnknownTypeCon { con: err.con })
    }
}
