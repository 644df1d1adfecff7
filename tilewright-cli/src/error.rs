//! Errors surfaced by the command line.

use std::path::PathBuf;

use thiserror::Error;
use tilewright_core::HookError;
use tilewright_data::{IngestError, RuleSetError};
use tilewright_render::EmitError;

use crate::config::ConfigError;

/// Everything that can end a build with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The rule table failed to load.
    #[error(transparent)]
    Rules(#[from] RuleSetError),
    /// Reading an extract failed.
    #[error(transparent)]
    Ingest(#[from] Box<IngestError>),
    /// The tag processor reported a failure.
    #[error(transparent)]
    Hook(#[from] HookError),
    /// Tile emission failed.
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// The MBTiles archive could not be created or written.
    #[error("failed to open archive {path}: {source}")]
    Archive {
        /// Location of the archive.
        path: PathBuf,
        /// Underlying database error.
        #[source]
        source: rusqlite::Error,
    },
    /// A layer asks for an external source but no clip box exists.
    #[error("layer {layer}: shapefile sources need a bounding box (header or configuration)")]
    SourceWithoutBoundingBox {
        /// Name of the offending layer.
        layer: String,
    },
    /// A layer asks for an external source this build cannot read.
    #[error("layer {layer}: no source loader is available in this build")]
    SourceUnsupported {
        /// Name of the offending layer.
        layer: String,
    },
}

impl From<IngestError> for CliError {
    fn from(source: IngestError) -> Self {
        Self::Ingest(Box::new(source))
    }
}
