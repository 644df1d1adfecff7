//! The tag-processing seam.
//!
//! A [`TagProcessor`] decides, per OSM element, which layers to write
//! and which attributes to attach. The pipeline hands it an
//! [`OsmElement`] view and collects the output objects it produced; the
//! processor never touches the stores. Implementations range from an
//! embedded interpreter binding to the native rule table shipped with
//! the data crate.

use std::collections::HashSet;

use geo::Rect;
use log::warn;
use thiserror::Error;

use crate::cached::GeometryCache;
use crate::layer::Layers;
use crate::output::{AttrValue, GeomKind, OutputObject};

/// Failure reported by a tag processor. Fatal for the whole build.
#[derive(Debug, Error)]
#[error("tag processor failed: {0}")]
pub struct HookError(pub String);

/// What kind of OSM element a view wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

/// A read-only view of one OSM element plus the output collector.
pub struct OsmElement<'a> {
    kind: ElementKind,
    id: u64,
    tags: Vec<(&'a str, &'a str)>,
    closed: bool,
    bbox: Option<Rect<f64>>,
    layers: &'a Layers,
    cache: &'a GeometryCache,
    outputs: Vec<OutputObject>,
}

impl<'a> OsmElement<'a> {
    pub fn new(
        kind: ElementKind,
        id: u64,
        tags: Vec<(&'a str, &'a str)>,
        closed: bool,
        bbox: Option<Rect<f64>>,
        layers: &'a Layers,
        cache: &'a GeometryCache,
    ) -> Self {
        Self {
            kind,
            id,
            tags,
            closed,
            bbox,
            layers,
            cache,
            outputs: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn is_relation(&self) -> bool {
        self.kind == ElementKind::Relation
    }

    /// True for ways whose first and last node coincide. Nodes and
    /// relations report true.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True when the element carries the tag key.
    pub fn holds(&self, key: &str) -> bool {
        self.tags.iter().any(|&(k, _)| k == key)
    }

    /// Value of the tag key, if present.
    pub fn find(&self, key: &str) -> Option<&'a str> {
        self.tags
            .iter()
            .find(|&&(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    pub fn tags(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.tags.iter().copied()
    }

    /// True when the element's bounding box touches any indexed source
    /// geometry of the named layer.
    pub fn intersects(&self, layer: &str) -> bool {
        match self.bbox {
            Some(bbox) => !self.cache.find_intersecting(layer, bbox).is_empty(),
            None => false,
        }
    }

    /// Index names of the source geometries the element's bounding box
    /// touches in the named layer.
    pub fn find_intersecting(&self, layer: &str) -> Vec<String> {
        match self.bbox {
            Some(bbox) => self.cache.intersecting_names(layer, bbox),
            None => Vec::new(),
        }
    }

    /// Write the element into a layer. `area` requests polygon
    /// geometry for ways; nodes always emit points and relations
    /// always emit polygons.
    pub fn layer(&mut self, name: &str, area: bool) {
        let Some(layer) = self.layers.index_of(name) else {
            warn!("element {}: unknown layer {name:?} ignored", self.id);
            return;
        };
        let kind = match self.kind {
            ElementKind::Node => GeomKind::Point,
            ElementKind::Way => {
                if area {
                    GeomKind::Polygon
                } else {
                    GeomKind::Linestring
                }
            }
            ElementKind::Relation => GeomKind::Polygon,
        };
        self.outputs.push(OutputObject::new(kind, layer, self.id));
    }

    /// Attach an attribute to the most recently written layer.
    pub fn attribute(&mut self, key: &str, value: impl Into<AttrValue>) {
        match self.outputs.last_mut() {
            Some(output) => output.set_attribute(key, value),
            None => warn!(
                "element {}: attribute {key:?} set before any layer, ignored",
                self.id
            ),
        }
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn outputs(&self) -> &[OutputObject] {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> Vec<OutputObject> {
        std::mem::take(&mut self.outputs)
    }
}

/// A tag processor labels elements with layers and attributes.
pub trait TagProcessor {
    /// Tag keys that make a node worth handing to [`node`](Self::node).
    /// Nodes without any of these keys are stored but never processed.
    fn node_keys(&self) -> HashSet<String>;

    /// Called once before the first element.
    fn init(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Handle a node carrying at least one significant key.
    fn node(&mut self, element: &mut OsmElement<'_>) -> Result<(), HookError>;

    /// Handle a way or a multipolygon relation.
    fn way(&mut self, element: &mut OsmElement<'_>) -> Result<(), HookError>;

    /// Called once after the last tile is written.
    fn finish(&mut self) -> Result<(), HookError> {
        Ok(())
    }
}
