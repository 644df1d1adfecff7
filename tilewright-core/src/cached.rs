//! Pre-built geometries from external layer sources, held in a side
//! array and referenced by the cached output-object kinds.
//!
//! Sources marked `index` additionally get a per-layer R-tree so the
//! tag processor can ask which source features an element touches.

use std::collections::HashMap;

use geo::{BoundingRect, Rect};
use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::Geometry;

/// One cached geometry with its optional index name.
#[derive(Debug, Clone)]
pub struct CachedGeometry {
    pub geometry: Geometry,
    pub name: Option<String>,
}

/// R-tree entry: a bounding envelope pointing at a cache slot.
#[derive(Debug, Clone)]
struct IndexEntry {
    envelope: AABB<[f64; 2]>,
    slot: u32,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The cached-geometry side array with its per-layer indices.
#[derive(Debug, Default)]
pub struct GeometryCache {
    items: Vec<CachedGeometry>,
    indices: HashMap<String, RTree<IndexEntry>>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a geometry and return its cache slot.
    pub fn add(&mut self, geometry: Geometry, name: Option<String>) -> u32 {
        let slot = self.items.len() as u32;
        self.items.push(CachedGeometry { geometry, name });
        slot
    }

    /// Store a geometry and register it with the named layer's index.
    pub fn add_indexed(&mut self, layer: &str, geometry: Geometry, name: Option<String>) -> u32 {
        let envelope = geometry_envelope(&geometry);
        let slot = self.add(geometry, name);
        if let Some(envelope) = envelope {
            self.indices
                .entry(layer.to_owned())
                .or_insert_with(RTree::new)
                .insert(IndexEntry { envelope, slot });
        }
        slot
    }

    pub fn get(&self, slot: u64) -> Option<&CachedGeometry> {
        usize::try_from(slot).ok().and_then(|slot| self.items.get(slot))
    }

    /// True when at least one layer carries an index, which is what
    /// makes intersection queries answerable.
    pub fn has_indices(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Cache slots of indexed geometries in `layer` whose envelope
    /// intersects `query`.
    pub fn find_intersecting(&self, layer: &str, query: Rect<f64>) -> Vec<u32> {
        let Some(tree) = self.indices.get(layer) else {
            return Vec::new();
        };
        let envelope = AABB::from_corners(
            [query.min().x, query.min().y],
            [query.max().x, query.max().y],
        );
        tree.locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.slot)
            .collect()
    }

    /// Index names of the matching geometries, for handing back to the
    /// tag processor.
    pub fn intersecting_names(&self, layer: &str, query: Rect<f64>) -> Vec<String> {
        self.find_intersecting(layer, query)
            .into_iter()
            .filter_map(|slot| self.items[slot as usize].name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn geometry_envelope(geometry: &Geometry) -> Option<AABB<[f64; 2]>> {
    let rect = match geometry {
        Geometry::Point(point) => point.bounding_rect().into(),
        Geometry::MultiLinestring(lines) => lines.bounding_rect(),
        Geometry::MultiPolygon(polygons) => polygons.bounding_rect(),
    };
    rect.map(|rect: Rect<f64>| {
        AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
    })
}
