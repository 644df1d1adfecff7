//! Ingestion for the tilewright pipeline.
//!
//! Responsibilities:
//! - Stream OSM PBF extracts into the core stores in three passes.
//! - Run the tag processor over significant elements.
//! - Provide the native rule-table processor used by the CLI.
//!
//! Boundaries:
//! - Geometry and store semantics live in `tilewright-core`.
//! - Tile serialization lives in `tilewright-render`.

#![forbid(unsafe_code)]

mod ingest;
mod rules;

pub use ingest::{read_header_bbox, IngestError, IngestSummary, Ingester};
pub use rules::{RuleSet, RuleSetError};
