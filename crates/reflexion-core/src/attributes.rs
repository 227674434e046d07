//! Typed attribute maps shared by nodes and edges.
//!
//! Attributes carry collaborator data (source locations, metrics, labels)
//! that the analysis never interprets.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Float, int, and string attribute maps plus a set of boolean toggles.
///
/// `IndexMap`/`IndexSet` keep insertion order so that serialized output and
/// iteration are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    floats: IndexMap<String, f64>,
    ints: IndexMap<String, i64>,
    strings: IndexMap<String, String>,
    toggles: IndexSet<String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, name: impl Into<String>, value: f64) {
        self.floats.insert(name.into(), value);
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.floats.get(name).copied()
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        self.ints.insert(name.into(), value);
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.ints.get(name).copied()
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(name.into(), value.into());
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    /// Sets or clears a toggle. Returns `true` if the toggle changed.
    pub fn set_toggle(&mut self, name: &str, on: bool) -> bool {
        if on {
            self.toggles.insert(name.to_string())
        } else {
            self.toggles.shift_remove(name)
        }
    }

    pub fn has_toggle(&self, name: &str) -> bool {
        self.toggles.contains(name)
    }

    /// Iterates all toggles that are currently set.
    pub fn toggles(&self) -> impl Iterator<Item = &str> {
        self.toggles.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty()
            && self.ints.is_empty()
            && self.strings.is_empty()
            && self.toggles.is_empty()
    }
}
