//! MBTiles archive writer.
//!
//! One SQLite database holding a `metadata` key/value table and a
//! `tiles` table keyed by zoom and TMS cell coordinates (row numbers
//! grow southwards in the tile scheme, so rows are flipped on insert).

use std::path::Path;

use rusqlite::{params, Connection};

use crate::sink::{SinkError, TileSink};

/// An open MBTiles archive.
pub struct Mbtiles {
    connection: Connection,
}

impl Mbtiles {
    /// Create (or reuse) an archive and ensure its schema.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "PRAGMA synchronous = OFF;
             CREATE TABLE IF NOT EXISTS metadata (name text, value text);
             CREATE TABLE IF NOT EXISTS tiles (
                 zoom_level integer,
                 tile_column integer,
                 tile_row integer,
                 tile_data blob
             );
             CREATE UNIQUE INDEX IF NOT EXISTS tile_index
                 ON tiles (zoom_level, tile_column, tile_row);",
        )?;
        Ok(Self { connection })
    }

    /// Write one metadata entry.
    pub fn write_metadata(&self, name: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.connection.execute(
            "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }

    /// Insert one tile blob, replacing any previous blob for the cell.
    pub fn save_tile(&self, zoom: u32, x: u32, y: u32, data: &[u8]) -> Result<(), rusqlite::Error> {
        let tms_row = (1u32 << zoom) - 1 - y;
        self.connection.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![zoom, x, tms_row, data],
        )?;
        Ok(())
    }
}

impl TileSink for Mbtiles {
    fn write_tile(&mut self, zoom: u32, x: u32, y: u32, data: &[u8]) -> Result<(), SinkError> {
        self.save_tile(zoom, x, y, data)?;
        Ok(())
    }
}
