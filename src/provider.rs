//! Collaborator ports consumed by the engine.
//!
//! The engine is agnostic to where reference data and list results come
//! from; it talks to three opaque collaborators:
//!
//! - [`LookupProvider`] — option lists for one cascade level under a parent
//! - [`QueryExecutor`] — the screen's primary paginated list query
//! - [`HistoryPort`] — browser URL read/replace, consumed only by the
//!   controller's host layer, never by chain or node code
//!
//! [`StaticLookupProvider`] is an in-memory implementation for tests and
//! for hosts shipping static lookup tables.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LookupError, QueryError};
use crate::filter::FilterQuery;

// ---------------------------------------------------------------------------
// Option type
// ---------------------------------------------------------------------------

/// One selectable option at a cascade level.
///
/// `value` is an opaque id unique within one level's result set; the
/// provider owns that uniqueness guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOption {
    pub value: String,
    pub label: String,
}

impl LookupOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Reference-data source for cascade levels.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Fetch the option list for `level_id` under `parent_id`.
    ///
    /// `parent_id` is `None` for a chain's root level.
    async fn fetch_options(
        &self,
        level_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<LookupOption>, LookupError>;
}

/// One page of the screen's primary list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    pub total: u64,
}

/// Executor for the screen's primary list query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run_query(&self, query: &FilterQuery) -> Result<Page, QueryError>;
}

/// Browser history collaborator.
///
/// `replace_url` swaps the query string without navigation so back/forward
/// and reload stay consistent with the currently applied filters.
pub trait HistoryPort: Send + Sync {
    fn read_current_url(&self) -> String;
    fn replace_url(&self, query: &str);
}

// ---------------------------------------------------------------------------
// StaticLookupProvider
// ---------------------------------------------------------------------------

type TableKey = (String, Option<String>);

/// In-memory provider backed by a `(level, parent) -> options` table.
///
/// Unknown keys resolve to an empty list rather than an error, matching how
/// a live provider answers for a parent with no children.
#[derive(Debug, Default)]
pub struct StaticLookupProvider {
    table: Mutex<HashMap<TableKey, Vec<LookupOption>>>,
}

impl StaticLookupProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the option list for `level_id` under `parent_id`.
    pub fn with_options(
        self,
        level_id: impl Into<String>,
        parent_id: Option<&str>,
        options: Vec<LookupOption>,
    ) -> Self {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((level_id.into(), parent_id.map(str::to_string)), options);
        self
    }

    /// Replace a registered option list after construction. Used to model
    /// reference data changing upstream between visits.
    pub fn set_options(
        &self,
        level_id: impl Into<String>,
        parent_id: Option<&str>,
        options: Vec<LookupOption>,
    ) {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((level_id.into(), parent_id.map(str::to_string)), options);
    }
}

#[async_trait]
impl LookupProvider for StaticLookupProvider {
    async fn fetch_options(
        &self,
        level_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<LookupOption>, LookupError> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table
            .get(&(level_id.to_string(), parent_id.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}
