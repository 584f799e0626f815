//! Reference-count classification of Core types.
//!
//! Every type is classified as [`NoRc`](RcClass::NoRc) (pure value, no
//! pointer content — machine integers and friends) or [`Rc`](RcClass::Rc)
//! (carries pointer content and needs dup/drop traffic). Classification
//! resolves the head type constructor through application and
//! quantification and consults the data-type registry:
//!
//! - `Value { scan: 0, .. }` — no pointer fields — is `NoRc`;
//! - everything else (heap types, value types with pointer fields,
//!   unresolved type variables, function types) is conservatively `Rc`.
//!
//! A named constructor missing from the registry is a broken earlier stage
//! and surfaces as an error, never a silent default.
//!
//! The same registry data drives the size arithmetic behind constructor
//! reuse: [`field_size`](TypeClassifier::field_size) and
//! [`constructor_size`](TypeClassifier::constructor_size).

use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashMap;

use keel_core::{ConRepr, DataRepr, Name, Newtypes, Ty};

/// Whether a type participates in reference counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RcClass {
    /// Pure value with no pointer fields; no dup/drop traffic.
    NoRc,
    /// Carries pointer content; every transfer of ownership is counted.
    Rc,
}

/// A type constructor the registry does not know.
///
/// The registry is complete by the time this pass runs, so this is a fatal
/// internal error for callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTypeCon {
    pub con: Name,
}

impl fmt::Display for UnknownTypeCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown type constructor `{}` in registry", self.con)
    }
}

impl std::error::Error for UnknownTypeCon {}

/// Type classifier backed by the data-type registry.
///
/// Caches per head constructor; interior mutability because classification
/// is a `&self` query used from deep inside the traversal.
pub struct TypeClassifier<'a> {
    newtypes: &'a Newtypes,
    cache: RefCell<FxHashMap<Name, RcClass>>,
}

impl<'a> TypeClassifier<'a> {
    pub fn new(newtypes: &'a Newtypes) -> Self {
        TypeClassifier {
            newtypes,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Classify a type.
    pub fn classify(&self, ty: &Ty) -> Result<RcClass, UnknownTypeCon> {
        match ty.head_con() {
            Some(con) => self.classify_con(con),
            // Type variables and function types: conservatively counted.
            None => Ok(RcClass::Rc),
        }
    }

    /// `true` when values of `ty` need dup/drop.
    pub fn needs_rc(&self, ty: &Ty) -> Result<bool, UnknownTypeCon> {
        Ok(self.classify(ty)? == RcClass::Rc)
    }

    fn classify_con(&self, con: &Name) -> Result<RcClass, UnknownTypeCon> {
        if let Some(&cached) = self.cache.borrow().get(con) {
            return Ok(cached);
        }
        let info = self.newtypes.lookup(con).ok_or_else(|| UnknownTypeCon {
            con: con.clone(),
        })?;
        let class = match info.repr {
            DataRepr::Value { scan: 0, .. } => RcClass::NoRc,
            DataRepr::Value { .. } | DataRepr::Heap => RcClass::Rc,
        };
        self.cache.borrow_mut().insert(con.clone(), class);
        Ok(class)
    }

    /// Size in words a field of type `ty` occupies in a heap cell: a value
    /// type contributes its full `raw + scan` footprint, anything else is
    /// one pointer.
    pub fn field_size(&self, ty: &Ty) -> Result<usize, UnknownTypeCon> {
        match ty.head_con() {
            Some(con) => {
                let info = self.newtypes.lookup(con).ok_or_else(|| UnknownTypeCon {
                    con: con.clone(),
                })?;
                Ok(match info.repr {
                    DataRepr::Value { raw, scan } => raw + scan,
                    DataRepr::Heap => 1,
                })
            }
            None => Ok(1),
        }
    }

    /// Heap-cell payload size of a constructor application, in words.
    /// Value constructors and nullary constructors allocate nothing.
    pub fn constructor_size(
        &self,
        repr: &ConRepr,
        param_types: &[Ty],
    ) -> Result<usize, UnknownTypeCon> {
        if repr.value || param_types.is_empty() {
            return Ok(0);
        }
        let mut size = 0;
        for ty in param_types {
            size += self.field_size(ty)?;
        }
        Ok(size)
    }
}
