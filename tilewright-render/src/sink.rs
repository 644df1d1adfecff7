//! Tile output targets: a directory tree of tile files or an MBTiles
//! archive.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while persisting tiles.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A tile file or directory could not be written.
    #[error("failed to write tile to {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The MBTiles archive rejected a statement.
    #[error("mbtiles archive error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Anything that accepts finished tile blobs keyed by zoom and cell.
pub trait TileSink {
    fn write_tile(&mut self, zoom: u32, x: u32, y: u32, data: &[u8]) -> Result<(), SinkError>;
}

/// Writes tiles as `<root>/<zoom>/<x>/<y>.pbf`, creating directories
/// on demand.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TileSink for DirectorySink {
    fn write_tile(&mut self, zoom: u32, x: u32, y: u32, data: &[u8]) -> Result<(), SinkError> {
        let dir = self.root.join(zoom.to_string()).join(x.to_string());
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{y}.pbf"));
        fs::write(&path, data).map_err(|source| SinkError::Io { path, source })
    }
}
