//! Command-line wiring: arguments, configuration, and the build run.

#![forbid(unsafe_code)]

mod config;
mod error;

use std::path::PathBuf;

use clap::Parser;
use log::info;
use tilewright_core::{clip_box, GeometryCache, OsmStore, TagProcessor, TileIndex};
use tilewright_data::{read_header_bbox, Ingester, RuleSet};
use tilewright_render::{DirectorySink, EmitOptions, Emitter, Mbtiles};

pub use config::{Config, ConfigError};
pub use error::CliError;

/// Convert OpenStreetMap extracts into vector tiles.
#[derive(Debug, Parser)]
#[command(name = "tilewright", version, about)]
pub struct Args {
    /// Source .osm.pbf extracts.
    #[arg(required = true)]
    pub input: Vec<PathBuf>,

    /// Target directory, or an .mbtiles/.sqlite archive.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// JSON rule table deciding layers and attributes per element.
    #[arg(short, long, default_value = "process.json")]
    pub process: PathBuf,

    /// Log per-object diagnostics.
    #[arg(long)]
    pub verbose: bool,
}

/// Run a full build for the parsed arguments.
pub fn run(args: &Args) -> Result<(), CliError> {
    let config = Config::load(&args.config)?;
    let mut processor = RuleSet::from_path(&args.process)?;
    processor.init()?;

    // The clip box comes from the configuration, or failing that from
    // the first extract's header. Only a configured box skips tiles.
    let configured_clip = config
        .bounding_box
        .map(|[min_lon, min_lat, max_lon, max_lat]| clip_box(min_lon, min_lat, max_lon, max_lat));
    let header_clip = match configured_clip {
        Some(_) => None,
        None => read_header_bbox(&args.input[0])
            .map_err(Box::new)?
            .map(|bbox| clip_box(bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y)),
    };

    let cache = GeometryCache::new();
    for def in config.layers.defs() {
        if def.source.is_none() {
            continue;
        }
        if configured_clip.or(header_clip).is_none() {
            return Err(CliError::SourceWithoutBoundingBox {
                layer: def.name.clone(),
            });
        }
        // Shapefile intake is delegated to an external loader; none is
        // wired into this binary.
        return Err(CliError::SourceUnsupported {
            layer: def.name.clone(),
        });
    }

    let mut store = OsmStore::new();
    let mut tile_index = TileIndex::new(config.base_zoom);
    {
        let mut ingester = Ingester::new(
            &mut store,
            &mut processor,
            &config.layers,
            &cache,
            &mut tile_index,
        );
        for input in &args.input {
            info!("reading {}", input.display());
            let summary = ingester.read_file(input)?;
            info!(
                "{}: {} nodes, {} ways ({} kept), {} relations ({} multipolygons)",
                input.display(),
                summary.nodes,
                summary.ways,
                summary.stored_ways,
                summary.relations,
                summary.multipolygons
            );
        }
    }

    let options = EmitOptions {
        min_zoom: config.min_zoom,
        max_zoom: config.max_zoom,
        include_ids: config.include_ids,
        compression: config.compression,
        clip: configured_clip.or(header_clip),
        clip_from_config: configured_clip.is_some(),
    };
    let emitter = Emitter::new(&store, &cache, &config.layers, options);

    let output_name = args.output.to_string_lossy();
    if output_name.ends_with(".mbtiles") || output_name.ends_with(".sqlite") {
        let mut archive = Mbtiles::open(&args.output).map_err(|source| CliError::Archive {
            path: args.output.clone(),
            source,
        })?;
        let metadata_err = |source| CliError::Archive {
            path: args.output.clone(),
            source,
        };
        archive.write_metadata("name", &config.name).map_err(metadata_err)?;
        archive
            .write_metadata("type", "baselayer")
            .map_err(metadata_err)?;
        archive
            .write_metadata("version", &config.version)
            .map_err(metadata_err)?;
        archive
            .write_metadata("description", &config.description)
            .map_err(metadata_err)?;
        archive.write_metadata("format", "pbf").map_err(metadata_err)?;
        for (key, value) in &config.metadata {
            archive.write_metadata(key, value).map_err(metadata_err)?;
        }
        emitter.emit(&mut tile_index, &mut archive)?;
    } else {
        let mut sink = DirectorySink::new(&args.output);
        emitter.emit(&mut tile_index, &mut sink)?;
    }
    info!("tileset written to {}", args.output.display());

    processor.finish()?;
    Ok(())
}

/// Initialise logging for the binary. Verbose builds log per-object
/// diagnostics.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_parse_with_defaults() {
        let args = Args::parse_from(["tilewright", "extract.osm.pbf", "--output", "tiles"]);
        assert_eq!(args.input, vec![PathBuf::from("extract.osm.pbf")]);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.process, PathBuf::from("process.json"));
        assert!(!args.verbose);
    }

    #[test]
    fn multiple_inputs_are_positional() {
        let args = Args::parse_from([
            "tilewright",
            "a.osm.pbf",
            "b.osm.pbf",
            "--output",
            "out.mbtiles",
        ]);
        assert_eq!(args.input.len(), 2);
    }
}
