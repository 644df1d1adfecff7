//! Output objects: what the tag processor decided to render, pending
//! geometry realization at emission time.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How an output object's geometry is realized.
///
/// The plain kinds synthesize geometry from the stores on demand; the
/// cached kinds reference a pre-built geometry held in the side array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeomKind {
    Point,
    Linestring,
    Polygon,
    CachedLinestring,
    CachedPolygon,
}

/// An attribute value carried onto an emitted feature.
#[derive(Debug, Clone)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    fn rank(&self) -> u8 {
        match self {
            AttrValue::String(_) => 0,
            AttrValue::Number(_) => 1,
            AttrValue::Bool(_) => 2,
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttrValue {}

impl PartialOrd for AttrValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttrValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttrValue::String(a), AttrValue::String(b)) => a.cmp(b),
            (AttrValue::Number(a), AttrValue::Number(b)) => a.total_cmp(b),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Attribute bag, ordered so output objects have a total order.
pub type Attributes = BTreeMap<String, AttrValue>;

/// One renderable object: a layer, a geometry kind, the identifier to
/// realize the geometry from, and the attributes to attach.
///
/// The derived order is lexicographic over (layer, kind, id,
/// attributes). Sorting a cell's objects therefore co-locates
/// duplicates for removal and merge candidates for the same-attribute
/// union at emission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutputObject {
    /// Index of the target layer.
    pub layer: u32,
    /// Geometry realization kind.
    pub kind: GeomKind,
    /// Node ID, way ID, pseudo relation ID, or cache slot, depending on
    /// `kind`.
    pub id: u64,
    /// Attributes for the emitted feature.
    pub attributes: Attributes,
}

impl OutputObject {
    pub fn new(kind: GeomKind, layer: u32, id: u64) -> Self {
        Self {
            layer,
            kind,
            id,
            attributes: Attributes::new(),
        }
    }

    /// Set one attribute, replacing any previous value under the key.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attributes.insert(key.to_owned(), value.into());
    }
}
