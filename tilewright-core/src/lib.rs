//! Core domain types for the tilewright pipeline.
//!
//! This crate holds everything between raw OSM decoding and tile
//! serialization: the append-only element stores, multipolygon
//! assembly, geometry realization, the output-object model, the tile
//! index, and the tag-processing seam. Ingestion lives in
//! `tilewright-data`, emission in `tilewright-render`.

#![forbid(unsafe_code)]

pub mod cached;
pub mod coords;
pub mod geometry;
pub mod layer;
pub mod multipolygon;
pub mod osm_store;
pub mod output;
pub mod process;
pub mod store;
pub mod tile_index;

pub use cached::{CachedGeometry, GeometryCache};
pub use coords::{lat2latp, latp2lat, meter2degp, LatpLon, TileBbox};
pub use geometry::Geometry;
pub use layer::{LayerDef, Layers};
pub use osm_store::{
    NodeId, NodeStore, OsmStore, RelationIdAllocator, RelationStore, WayId, WayStore, INNER_MARK,
    OUTER_MARK, REVERSE_MARK,
};
pub use output::{AttrValue, Attributes, GeomKind, OutputObject};
pub use process::{ElementKind, HookError, OsmElement, TagProcessor};
pub use store::StoreError;
pub use tile_index::{clip_box, way_footprint, TileIndex};
