//! Cascading reference-data resolution.
//!
//! A chain of dependent select levels (country → city → county → district)
//! where each level's valid options depend on the parent level's current
//! value. The chain guarantees:
//!
//! - options shown as ready were fetched for the **current** parent value,
//!   never a stale one,
//! - a superseded fetch's response is discarded on arrival, regardless of
//!   network completion order,
//! - changing an ancestor deterministically clears every descendant and
//!   reloads only the immediately-next level (deeper levels load lazily),
//! - a full selection can be rebuilt from externally stored ids
//!   ([`CascadeChain::hydrate`]), halting gracefully when a stored id no
//!   longer exists upstream.
//!
//! ```text
//! select("country", "US")
//!         │
//!         ▼
//! CascadeChain ── propagation token (one walk at a time)
//!         │
//!         ├─► city.set_parent("US")      → clear + Loading + fetch
//!         ├─► county.set_parent(None)    → clear + Idle (no fetch)
//!         └─► district.set_parent(None)  → clear + Idle (no fetch)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

mod chain;
mod node;

pub use chain::{CascadeChain, ChainError, ChainSnapshot, HydrationHalt, HydrationOutcome};
pub use node::{CascadeNode, NodeSnapshot};

// ---------------------------------------------------------------------------
// Static chain configuration
// ---------------------------------------------------------------------------

/// Static descriptor of one level in a dependency chain.
///
/// Defined once per chain. A level without a parent is the chain root; its
/// options are fetched with a `None` parent key when the chain is primed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeLevelSpec {
    pub id: String,
    pub parent_level_id: Option<String>,
}

impl CascadeLevelSpec {
    /// Root level of a chain.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_level_id: None,
        }
    }

    /// Dependent level whose options are keyed by the parent's selection.
    pub fn child(id: impl Into<String>, parent_level_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_level_id: Some(parent_level_id.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Level status
// ---------------------------------------------------------------------------

/// Lifecycle status of one level's option list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStatus {
    /// No parent selected (dependent levels) or never primed (root).
    Idle,
    /// A fetch for the current parent value is in flight.
    Loading,
    /// Options correspond to the current parent value.
    Ready,
    /// The latest fetch for the current parent value failed.
    Error,
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelStatus::Idle => write!(f, "idle"),
            LevelStatus::Loading => write!(f, "loading"),
            LevelStatus::Ready => write!(f, "ready"),
            LevelStatus::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// An ordered, possibly partial selection along one chain: `(level_id,
/// selected value)` pairs from the root downward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSelection {
    entries: Vec<(String, String)>,
}

impl CascadeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or replace the selection for `level_id`, preserving order of
    /// first insertion.
    pub fn set(&mut self, level_id: impl Into<String>, value: impl Into<String>) {
        let level_id = level_id.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(l, _)| *l == level_id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((level_id, value)),
        }
    }

    pub fn with(mut self, level_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(level_id, value);
        self
    }

    pub fn get(&self, level_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == level_id)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_spec_constructors() {
        let root = CascadeLevelSpec::root("country");
        assert!(root.parent_level_id.is_none());

        let child = CascadeLevelSpec::child("city", "country");
        assert_eq!(child.parent_level_id.as_deref(), Some("country"));
    }

    #[test]
    fn test_selection_set_preserves_order() {
        let mut sel = CascadeSelection::new();
        sel.set("country", "TR");
        sel.set("city", "ANK");
        sel.set("country", "US");

        let pairs: Vec<_> = sel.iter().collect();
        assert_eq!(pairs, vec![("country", "US"), ("city", "ANK")]);
    }

    #[test]
    fn test_selection_get() {
        let sel = CascadeSelection::new().with("country", "TR");
        assert_eq!(sel.get("country"), Some("TR"));
        assert_eq!(sel.get("city"), None);
    }
}
