//! Filter field configuration and the immutable screen state snapshot.
//!
//! A screen declares its filterable fields once as `FilterFieldSpec`s; the
//! engine is agnostic to what the fields mean. `FilterState` is a value:
//! every update produces a new snapshot, and host code reads snapshots and
//! writes through controller actions only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cascade::CascadeSelection;

// ---------------------------------------------------------------------------
// Field specs
// ---------------------------------------------------------------------------

/// The shape of one filter field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Free text (substring search).
    Text,
    /// Nullable ISO date.
    Date,
    /// Nullable single-select id.
    Single,
    /// Multi-select id list.
    Multi,
    /// Hierarchical selection driven by a cascade chain. `levels` mirrors
    /// the chain's level ids and doubles as the URL keys for each level.
    Cascade {
        chain_id: String,
        levels: Vec<String>,
    },
}

impl FieldKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Single => "single-select",
            FieldKind::Multi => "multi-select",
            FieldKind::Cascade { .. } => "cascade",
        }
    }
}

/// Static descriptor of one filter field on a screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFieldSpec {
    /// Field name; also the URL parameter name for non-cascade fields.
    pub name: String,
    pub kind: FieldKind,
    /// Key emitted into the query projection when it differs from `name`
    /// (e.g. URL `startDate` projecting as `createdAtStart`).
    pub query_key: Option<String>,
}

impl FilterFieldSpec {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            query_key: None,
        }
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Date,
            query_key: None,
        }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Single,
            query_key: None,
        }
    }

    pub fn multi(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Multi,
            query_key: None,
        }
    }

    pub fn cascade<I, S>(name: impl Into<String>, chain_id: impl Into<String>, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Cascade {
                chain_id: chain_id.into(),
                levels: levels.into_iter().map(Into::into).collect(),
            },
            query_key: None,
        }
    }

    pub fn with_query_key(mut self, key: impl Into<String>) -> Self {
        self.query_key = Some(key.into());
        self
    }

    /// Key used in the query projection.
    pub(crate) fn projected_key(&self) -> &str {
        self.query_key.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// The value of one filter field inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    Date(NaiveDate),
    Single(String),
    Multi(Vec<String>),
    Cascade(CascadeSelection),
}

impl FilterValue {
    /// Whether the value is at its canonical empty default and should be
    /// dropped from snapshots and URLs.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(v) => v.trim().is_empty(),
            FilterValue::Date(_) => false,
            FilterValue::Single(v) => v.is_empty(),
            FilterValue::Multi(ids) => ids.is_empty(),
            FilterValue::Cascade(sel) => sel.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// FilterState
// ---------------------------------------------------------------------------

/// Immutable snapshot of a screen's filter fields plus pagination.
///
/// Empty values are never stored; `get` returning `None` means "at
/// default". Page size is session state, not shareable URL state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    fields: BTreeMap<String, FilterValue>,
    page: u32,
    page_size: u32,
}

impl FilterState {
    pub const DEFAULT_PAGE_SIZE: u32 = 25;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// All fields at default and first page.
    pub fn is_default(&self) -> bool {
        self.fields.is_empty() && self.page == 1
    }

    /// New snapshot with `name` set. Setting an empty value removes the
    /// field, keeping snapshots canonical.
    pub fn with_field(mut self, name: impl Into<String>, value: FilterValue) -> Self {
        let name = name.into();
        if value.is_empty() {
            self.fields.remove(&name);
        } else {
            self.fields.insert(name, value);
        }
        self
    }

    /// New snapshot without `name`.
    pub fn without_field(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}
