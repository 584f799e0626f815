//! Typed Core IR for the Keel compiler.
//!
//! Core is the small functional IR that optimization passes operate on:
//! lambdas, applications, lets, and multi-scrutinee pattern matches over
//! typed names. This crate provides:
//!
//! - the tree itself ([`Expr`], [`Def`], [`DefGroup`], [`Branch`],
//!   [`Pattern`], [`Module`]) with construction helpers for the encoded
//!   forms (statement sequencing, `if` over `bool` constructors);
//! - names and types ([`Name`], [`TName`], [`Ty`]) and the fresh-name
//!   counter ([`Uniq`]);
//! - the data-type registry interface ([`Newtypes`]) that records which
//!   types are unboxed values and which carry pointer content;
//! - the traversal utilities passes rely on: free-local computation
//!   ([`free_locals`]) and scope-aware variable substitution
//!   ([`subst_vars`]);
//! - compact `Display` rendering for trace output.
//!
//! No parsing, inference, or code generation lives here — earlier stages
//! produce a [`Module`], passes rewrite it.

pub mod expr;
pub mod free_vars;
pub mod name;
pub mod newtypes;
pub mod pretty;
pub mod subst;
pub mod ty;

pub use expr::{Branch, Def, DefGroup, Expr, Guard, Lit, Module, Pattern, VarInfo};
pub use free_vars::free_locals;
pub use name::{Name, TName, Uniq};
pub use newtypes::{ConRepr, DataInfo, DataRepr, Newtypes};
pub use subst::subst_vars;
pub use ty::{Ty, TypeVar};
