//! Analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::ReflexionError;

/// Knobs that change how propagated dependencies are classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexionConfig {
    /// Whether a dependency from an architecture node to one of its
    /// ancestors is implicitly allowed. Dependencies from an ancestor down
    /// to a descendant are never implicitly allowed.
    pub allow_dependencies_to_parents: bool,
}

impl Default for ReflexionConfig {
    fn default() -> Self {
        ReflexionConfig {
            allow_dependencies_to_parents: true,
        }
    }
}

impl ReflexionConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ReflexionError> {
        serde_json::from_str(json).map_err(|e| ReflexionError::Config {
            reason: e.to_string(),
        })
    }

    pub fn with_dependencies_to_parents(mut self, allow: bool) -> Self {
        self.allow_dependencies_to_parents = allow;
        self
    }
}
