//! Layer definitions and grouping.
//!
//! Layers are declared by configuration in order. A layer may ask to be
//! written into another layer's output group (`write_to`); each group
//! becomes one emitted tile layer named after its first member.

use std::collections::HashMap;
use std::path::PathBuf;

use log::warn;

use crate::coords::{meter2degp, TileBbox};

/// One configured layer.
#[derive(Debug, Clone)]
pub struct LayerDef {
    pub name: String,
    pub min_zoom: u32,
    pub max_zoom: u32,
    /// Zooms strictly below this are simplified.
    pub simplify_below: u32,
    /// Tolerance in projected degrees.
    pub simplify_level: f64,
    /// Tolerance in metres; overrides `simplify_level` when positive.
    pub simplify_length: f64,
    /// Per-zoom-step tolerance multiplier.
    pub simplify_ratio: f64,
    /// Optional pre-clipped external source for cached geometries.
    pub source: Option<PathBuf>,
    /// Source attributes passed through onto features.
    pub source_columns: Vec<String>,
    /// Build a spatial index over the source geometries.
    pub indexed: bool,
    /// Source attribute used as the index name.
    pub index_column: Option<String>,
}

impl LayerDef {
    pub fn new(name: impl Into<String>, min_zoom: u32, max_zoom: u32) -> Self {
        Self {
            name: name.into(),
            min_zoom,
            max_zoom,
            simplify_below: 0,
            simplify_level: 0.01,
            simplify_length: 0.0,
            simplify_ratio: 1.0,
            source: None,
            source_columns: Vec::new(),
            indexed: false,
            index_column: None,
        }
    }

    /// Effective simplification tolerance for a tile of this layer, in
    /// projected degrees. Zero means no simplification.
    pub fn simplify_tolerance(&self, bbox: &TileBbox) -> f64 {
        if bbox.zoom >= self.simplify_below {
            return 0.0;
        }
        let base = if self.simplify_length > 0.0 {
            meter2degp(self.simplify_length, bbox.center_latp())
        } else {
            self.simplify_level
        };
        base * self
            .simplify_ratio
            .powi(((self.simplify_below - 1) - bbox.zoom) as i32)
    }
}

/// The ordered layer set with its output grouping.
#[derive(Debug, Default)]
pub struct Layers {
    defs: Vec<LayerDef>,
    groups: Vec<Vec<u32>>,
    by_name: HashMap<String, u32>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer, optionally aliased into the output group of a
    /// previously declared layer, and return its index.
    pub fn add(&mut self, def: LayerDef, write_to: Option<&str>) -> u32 {
        let index = self.defs.len() as u32;
        self.by_name.insert(def.name.clone(), index);
        match write_to.and_then(|target| self.by_name.get(target).copied()) {
            Some(target_index) => {
                let group = self
                    .groups
                    .iter_mut()
                    .find(|group| group.contains(&target_index))
                    .expect("grouped layer indices are always registered");
                group.push(index);
            }
            None => {
                if write_to.is_some() {
                    warn!(
                        "layer {}: write_to target {:?} is not declared yet, starting a new group",
                        def.name, write_to
                    );
                }
                self.groups.push(vec![index]);
            }
        }
        self.defs.push(def);
        index
    }

    pub fn get(&self, index: u32) -> &LayerDef {
        &self.defs[index as usize]
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Output groups in declaration order. The emitted layer is named
    /// after the group's first member.
    pub fn groups(&self) -> &[Vec<u32>] {
        &self.groups
    }

    pub fn defs(&self) -> &[LayerDef] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
