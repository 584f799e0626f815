//! Precise automatic reference counting for Keel Core IR.
//!
//! This crate rewrites a Core [`Module`] so that every heap reference is
//! explicitly retained (`dup`) or released (`drop`) exactly when ownership
//! changes: no reference outlives its last use, no value is dropped while
//! still reachable, and a uniquely owned cell reaches its consumer with a
//! reference count of one — the precondition for in-place reuse.
//!
//! The crate provides:
//!
//! - **Type classification** ([`RcClass`], [`TypeClassifier`]) — which
//!   types carry pointer content and need counting at all;
//! - **Primitive emission** ([`prim`]) — `dup`, `drop`, the uniqueness
//!   test, `free`, and the reuse-token operations as Core syntax;
//! - **Analysis state** ([`Parc`]) — the owned and live sets with scoped
//!   save/restore combinators;
//! - **Case normalization** ([`normalize`]) — every scrutinee a variable,
//!   no top-level binder patterns;
//! - **The transformation** ([`transform`]) — the right-to-left liveness
//!   walk that places the operations;
//! - **The driver** ([`parc_module`]) — per-module entry point, walking
//!   top-level definition groups in reverse with per-definition isolation.
//!
//! # Enablement
//!
//! The pass is gated by the `KK_PARC` environment variable
//! (`1`/`on`/`yes`/`true`/`y`/`t`, case-insensitive). The flag is read once
//! and carried as plain data ([`ParcOptions`]); disabled, the input module
//! is returned unchanged.
//!
//! # Errors
//!
//! All failures are compiler bugs, not user errors: a recursive `let` at
//! expression level, a capture/liveness mismatch at a lambda, or a type
//! constructor missing from the registry abort the pass with a
//! [`ParcError`] naming the definition chain.

use std::sync::OnceLock;

use keel_core::{DefGroup, Module, Newtypes, Uniq};

pub mod classify;
pub mod normalize;
pub mod prim;
pub mod state;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use classify::{RcClass, TypeClassifier, UnknownTypeCon};
pub use state::{Live, Parc, ParcError, ParcErrorKind};

/// Configuration of the pass: just the enable flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParcOptions {
    pub enabled: bool,
}

impl ParcOptions {
    pub fn enabled() -> Self {
        ParcOptions { enabled: true }
    }

    pub fn disabled() -> Self {
        ParcOptions { enabled: false }
    }

    /// Read `KK_PARC` once; later calls reuse the cached answer.
    pub fn from_env() -> Self {
        static ENABLED: OnceLock<bool> = OnceLock::new();
        let enabled = *ENABLED.get_or_init(|| {
            std::env::var("KK_PARC")
                .map(|value| parse_enable_flag(&value))
                .unwrap_or(false)
        });
        ParcOptions { enabled }
    }
}

fn parse_enable_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "on" | "yes" | "true" | "y" | "t"
    )
}

/// Insert reference-count operations into every definition of a module.
///
/// Definition groups are processed in reverse so a later definition's uses
/// are accounted before an earlier definition is analyzed; each top-level
/// definition runs isolated so its liveness cannot bleed into a
/// neighbor's. The module keeps its top-level shape; only definition
/// bodies are rewritten.
///
/// With the pass disabled, the input is returned unchanged.
pub fn parc_module(
    module: Module,
    newtypes: &Newtypes,
    uniq: &mut Uniq,
    options: &ParcOptions,
) -> Result<Module, ParcError> {
    if !options.enabled {
        return Ok(module);
    }
    tracing::debug!(module = %module.name, "inserting reference-count operations");

    let mut parc = Parc::new(newtypes, uniq);
    let def_groups = transform::reverse_map(&mut parc, module.def_groups, parc_def_group)?;

    let module = Module {
        name: module.name,
        def_groups,
    };
    tracing::trace!(rewritten = %module, "parc result");
    Ok(module)
}

fn parc_def_group(parc: &mut Parc<'_>, group: DefGroup) -> Result<DefGroup, ParcError> {
    match group {
        DefGroup::NonRec(def) => Ok(DefGroup::NonRec(transform::parc_def(parc, true, def)?)),
        DefGroup::Rec(defs) => Ok(DefGroup::Rec(transform::reverse_map(
            parc,
            defs,
            |parc, def| transform::parc_def(parc, true, def),
        )?)),
    }
}

#[cfg(test)]
mod tests;
