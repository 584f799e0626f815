//! Data-type registry.
//!
//! Maps a type-constructor name to its representation descriptor. Earlier
//! stages populate the registry; analyses only query it. The essential bit
//! for reference counting is whether values of a type are pure scalars
//! (`Value` with zero pointer fields) or carry pointer content.

use rustc_hash::FxHashMap;

use crate::name::Name;

/// Representation of a data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataRepr {
    /// Unboxed value type: `raw` word-sized scalar fields and `scan`
    /// pointer fields.
    Value { raw: usize, scan: usize },
    /// Heap-allocated.
    Heap,
}

/// Registry entry for one type constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataInfo {
    pub name: Name,
    pub repr: DataRepr,
}

impl DataInfo {
    pub fn new(name: Name, repr: DataRepr) -> Self {
        DataInfo { name, repr }
    }
}

/// Representation of a single constructor, carried on `Con` expressions and
/// constructor patterns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConRepr {
    /// The data type this constructor belongs to.
    pub type_name: Name,
    /// `true` when the constructor builds an unboxed value.
    pub value: bool,
}

impl ConRepr {
    pub fn heap(type_name: Name) -> Self {
        ConRepr {
            type_name,
            value: false,
        }
    }

    pub fn value(type_name: Name) -> Self {
        ConRepr {
            type_name,
            value: true,
        }
    }
}

/// The data-type registry, complete by the time analyses run.
#[derive(Clone, Debug, Default)]
pub struct Newtypes {
    map: FxHashMap<Name, DataInfo>,
}

impl Newtypes {
    pub fn new() -> Self {
        Newtypes::default()
    }

    /// Register a data type, replacing any previous entry.
    pub fn insert(&mut self, info: DataInfo) {
        self.map.insert(info.name.clone(), info);
    }

    /// Look up a type constructor. `None` means the registry is broken —
    /// callers treat that as a fatal internal error.
    pub fn lookup(&self, name: &Name) -> Option<&DataInfo> {
        self.map.get(name)
    }
}

impl FromIterator<DataInfo> for Newtypes {
    fn from_iter<I: IntoIterator<Item = DataInfo>>(iter: I) -> Self {
        let mut newtypes = Newtypes::new();
        for info in iter {
            newtypes.insert(info);
        }
        newtypes
    }
}
