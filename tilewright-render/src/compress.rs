//! Tile blob compression.

use std::io::{self, Write};
use std::str::FromStr;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as Level;

/// How encoded tiles are compressed before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Gzip,
    /// Zlib-wrapped deflate.
    Deflate,
    None,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "gzip" => Ok(Compression::Gzip),
            "deflate" => Ok(Compression::Deflate),
            "none" => Ok(Compression::None),
            other => Err(format!(
                "compress must be one of \"gzip\", \"deflate\", \"none\", got {other:?}"
            )),
        }
    }
}

/// Compress one tile blob.
pub fn compress_tile(data: &[u8], compression: Compression) -> io::Result<Vec<u8>> {
    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Level::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::None => Ok(data.to_vec()),
    }
}
