//! JSON configuration: global settings plus the layer table.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tilewright_core::{LayerDef, Layers};
use tilewright_render::Compression;

/// Errors raised while loading the configuration. All fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// Location of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid JSON of the expected shape.
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        /// Location of the configuration file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// `maxzoom` exceeds `basezoom`.
    #[error("maxzoom {max_zoom} must not exceed basezoom {base_zoom}")]
    ZoomRange {
        /// Configured maximum output zoom.
        max_zoom: u32,
        /// Configured base zoom.
        base_zoom: u32,
    },
    /// The tile index packs cell coordinates into 16 bits per axis.
    #[error("basezoom {base_zoom} is too large; the tile index supports up to 16")]
    BaseZoomTooLarge {
        /// Configured base zoom.
        base_zoom: u32,
    },
    /// `settings.compress` named an unknown scheme.
    #[error("{0}")]
    Compress(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    settings: RawSettings,
    layers: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    basezoom: u32,
    minzoom: u32,
    maxzoom: u32,
    include_ids: bool,
    compress: String,
    name: String,
    version: String,
    description: String,
    #[serde(default)]
    bounding_box: Option<[f64; 4]>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    minzoom: u32,
    maxzoom: u32,
    #[serde(default)]
    write_to: Option<String>,
    #[serde(default)]
    simplify_below: Option<u32>,
    #[serde(default)]
    simplify_level: Option<f64>,
    #[serde(default)]
    simplify_length: Option<f64>,
    #[serde(default)]
    simplify_ratio: Option<f64>,
    #[serde(default)]
    source: Option<PathBuf>,
    #[serde(default)]
    source_columns: Vec<String>,
    #[serde(default)]
    index: bool,
    #[serde(default)]
    index_column: Option<String>,
}

/// The loaded build configuration.
#[derive(Debug)]
pub struct Config {
    pub base_zoom: u32,
    pub min_zoom: u32,
    pub max_zoom: u32,
    pub include_ids: bool,
    pub compression: Compression,
    pub name: String,
    pub version: String,
    pub description: String,
    /// `[min_lon, min_lat, max_lon, max_lat]` in WGS84 degrees.
    pub bounding_box: Option<[f64; 4]>,
    /// Extra archive metadata; non-string values arrive JSON-encoded.
    pub metadata: Vec<(String, String)>,
    pub layers: Layers,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?;
        let raw: RawConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let settings = raw.settings;
        if settings.maxzoom > settings.basezoom {
            return Err(ConfigError::ZoomRange {
                max_zoom: settings.maxzoom,
                base_zoom: settings.basezoom,
            });
        }
        if settings.basezoom > 16 {
            return Err(ConfigError::BaseZoomTooLarge {
                base_zoom: settings.basezoom,
            });
        }
        let compression = settings.compress.parse().map_err(ConfigError::Compress)?;

        let mut layers = Layers::new();
        for (name, value) in raw.layers {
            let raw_layer: RawLayer =
                serde_json::from_value(value).map_err(|source| ConfigError::Parse {
                    path: PathBuf::from(format!("layers.{name}")),
                    source,
                })?;
            let mut def = LayerDef::new(&name, raw_layer.minzoom, raw_layer.maxzoom);
            if let Some(simplify_below) = raw_layer.simplify_below {
                def.simplify_below = simplify_below;
            }
            if let Some(simplify_level) = raw_layer.simplify_level {
                def.simplify_level = simplify_level;
            }
            if let Some(simplify_length) = raw_layer.simplify_length {
                def.simplify_length = simplify_length;
            }
            if let Some(simplify_ratio) = raw_layer.simplify_ratio {
                def.simplify_ratio = simplify_ratio;
            }
            def.source = raw_layer.source;
            def.source_columns = raw_layer.source_columns;
            def.indexed = raw_layer.index;
            def.index_column = raw_layer.index_column;
            layers.add(def, raw_layer.write_to.as_deref());
        }

        let metadata = settings
            .metadata
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(value) => (key, value),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(Self {
            base_zoom: settings.basezoom,
            min_zoom: settings.minzoom,
            max_zoom: settings.maxzoom,
            include_ids: settings.include_ids,
            compression,
            name: settings.name,
            version: settings.version,
            description: settings.description,
            bounding_box: settings.bounding_box,
            metadata,
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(settings_extra: &str, layers: &str) -> Result<Config, ConfigError> {
        let json = format!(
            r#"{{
                "settings": {{
                    "basezoom": 14,
                    "minzoom": 0,
                    "maxzoom": 14,
                    "include_ids": false,
                    "compress": "gzip",
                    "name": "test",
                    "version": "1.0",
                    "description": "test build"
                    {settings_extra}
                }},
                "layers": {{ {layers} }}
            }}"#
        );
        let raw: RawConfig = serde_json::from_str(&json).unwrap();
        Config::from_raw(raw)
    }

    #[test]
    fn minimal_configuration_loads() {
        let config = parse("", r#""roads": {"minzoom": 6, "maxzoom": 14}"#).unwrap();
        assert_eq!(config.base_zoom, 14);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.layers.len(), 1);
        assert_eq!(config.layers.index_of("roads"), Some(0));
    }

    #[test]
    fn maxzoom_above_basezoom_is_rejected() {
        let json = r#"{
            "settings": {
                "basezoom": 10, "minzoom": 0, "maxzoom": 12,
                "include_ids": false, "compress": "none",
                "name": "", "version": "", "description": ""
            },
            "layers": {}
        }"#;
        let raw: RawConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            Config::from_raw(raw),
            Err(ConfigError::ZoomRange { .. })
        ));
    }

    #[test]
    fn unknown_compression_is_rejected() {
        let json = r#"{
            "settings": {
                "basezoom": 10, "minzoom": 0, "maxzoom": 10,
                "include_ids": false, "compress": "zstd",
                "name": "", "version": "", "description": ""
            },
            "layers": {}
        }"#;
        let raw: RawConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            Config::from_raw(raw),
            Err(ConfigError::Compress(_))
        ));
    }

    #[test]
    fn layer_options_and_grouping_are_honoured() {
        let config = parse(
            "",
            r#"
            "roads": {"minzoom": 6, "maxzoom": 14, "simplify_below": 12,
                      "simplify_level": 0.002, "simplify_ratio": 2.0},
            "rail": {"minzoom": 8, "maxzoom": 14, "write_to": "roads"}
            "#,
        )
        .unwrap();
        assert_eq!(config.layers.groups(), &[vec![0, 1]]);
        let roads = config.layers.get(0);
        assert_eq!(roads.simplify_below, 12);
        assert!((roads.simplify_level - 0.002).abs() < 1e-12);
    }

    #[test]
    fn metadata_values_pass_through_with_json_fallback() {
        let config = parse(
            r#", "metadata": {"attribution": "OSM", "bounds": [0, 0, 1, 1]}"#,
            "",
        )
        .unwrap();
        let mut metadata = config.metadata.clone();
        metadata.sort();
        assert_eq!(
            metadata,
            vec![
                ("attribution".to_owned(), "OSM".to_owned()),
                ("bounds".to_owned(), "[0,0,1,1]".to_owned()),
            ]
        );
    }

    #[test]
    fn bounding_box_is_optional() {
        let config = parse(r#", "bounding_box": [-1.0, 50.0, 1.0, 52.0]"#, "").unwrap();
        assert_eq!(config.bounding_box, Some([-1.0, 50.0, 1.0, 52.0]));
    }
}
