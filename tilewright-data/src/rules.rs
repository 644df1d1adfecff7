//! A native rule table implementing [`TagProcessor`].
//!
//! Stands in for an embedded scripting interpreter: each rule matches
//! one tag on one element kind and writes one layer, optionally
//! copying further tag values through as attributes.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tilewright_core::{HookError, OsmElement, TagProcessor};

/// Errors raised while loading a rule file.
#[derive(Debug, Error)]
pub enum RuleSetError {
    /// The rule file could not be read.
    #[error("failed to read rule file {path}: {source}")]
    Io {
        /// Location of the rule file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The rule file is not valid JSON of the expected shape.
    #[error("failed to parse rule file {path}: {source}")]
    Parse {
        /// Location of the rule file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Which element kind a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RuleKind {
    Node,
    Way,
    Relation,
}

/// One tag-match rule.
#[derive(Debug, Clone, Deserialize)]
struct Rule {
    /// Element kind the rule applies to.
    on: RuleKind,
    /// Tag key that must be present.
    key: String,
    /// Tag value that must match; any value when absent.
    #[serde(default)]
    value: Option<String>,
    /// Layer to write.
    layer: String,
    /// Emit polygon geometry for matching ways.
    #[serde(default)]
    area: bool,
    /// Tag keys copied through as string attributes.
    #[serde(default)]
    attributes: Vec<String>,
}

impl Rule {
    fn matches(&self, element: &OsmElement<'_>) -> bool {
        match element.find(&self.key) {
            Some(found) => self.value.as_deref().is_none_or(|want| want == found),
            None => false,
        }
    }

    fn apply(&self, element: &mut OsmElement<'_>) {
        element.layer(&self.layer, self.area);
        for key in &self.attributes {
            if let Some(value) = element.find(key) {
                element.attribute(key, value);
            }
        }
    }
}

/// A deserialized rule table.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    /// Extra keys that make nodes significant beyond the node rules.
    #[serde(default)]
    node_keys: Vec<String>,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Load a rule table from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, RuleSetError> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| RuleSetError::Io {
                path: path.to_owned(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| RuleSetError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn apply_matching(&self, element: &mut OsmElement<'_>, kind: RuleKind) {
        for rule in &self.rules {
            if rule.on == kind && rule.matches(element) {
                rule.apply(element);
            }
        }
    }
}

impl TagProcessor for RuleSet {
    fn node_keys(&self) -> HashSet<String> {
        let mut keys: HashSet<String> = self.node_keys.iter().cloned().collect();
        keys.extend(
            self.rules
                .iter()
                .filter(|rule| rule.on == RuleKind::Node)
                .map(|rule| rule.key.clone()),
        );
        keys
    }

    fn node(&mut self, element: &mut OsmElement<'_>) -> Result<(), HookError> {
        self.apply_matching(element, RuleKind::Node);
        Ok(())
    }

    fn way(&mut self, element: &mut OsmElement<'_>) -> Result<(), HookError> {
        let kind = if element.is_relation() {
            RuleKind::Relation
        } else {
            RuleKind::Way
        };
        self.apply_matching(element, kind);
        Ok(())
    }
}
