//! Facade crate for the tilewright tile builder.
//!
//! Re-exports the core pipeline pieces: stores and geometry from
//! `tilewright-core`, ingestion from `tilewright-data`, and emission
//! from `tilewright-render`. The command line lives in
//! `tilewright-cli`.

#![forbid(unsafe_code)]

pub use tilewright_core::{
    clip_box, way_footprint, AttrValue, Attributes, CachedGeometry, ElementKind, GeomKind,
    Geometry, GeometryCache, HookError, LatpLon, LayerDef, Layers, NodeId, NodeStore, OsmElement,
    OsmStore, OutputObject, RelationIdAllocator, RelationStore, StoreError, TagProcessor,
    TileBbox, TileIndex, WayId, WayStore, INNER_MARK, OUTER_MARK, REVERSE_MARK,
};

pub use tilewright_data::{read_header_bbox, IngestError, IngestSummary, Ingester, RuleSet};

pub use tilewright_render::{
    compress_tile, Compression, DirectorySink, EmitError, EmitOptions, Emitter, Mbtiles,
    SinkError, TileSink,
};
