//! Tile emission for the tilewright pipeline.
//!
//! Takes the populated stores and tile index, realizes geometry per
//! tile, and serializes vector tiles into a directory tree or an
//! MBTiles archive.

#![forbid(unsafe_code)]

mod compress;
mod emit;
mod mbtiles;
mod sink;
mod writer;

pub use compress::{compress_tile, Compression};
pub use emit::{EmitError, EmitOptions, Emitter};
pub use mbtiles::Mbtiles;
pub use sink::{DirectorySink, SinkError, TileSink};
