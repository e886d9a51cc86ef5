//! Pure projection from `FilterState` to the shape the query executor
//! expects.
//!
//! Field specs may rename keys (`query_key`), which is the only place
//! screen-specific names enter the otherwise generic engine. Cascade levels
//! project one id parameter per selected level, keyed by level id.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::filter::state::{FilterFieldSpec, FilterState, FilterValue};

/// One typed query parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Text(String),
    Id(String),
    IdList(Vec<String>),
    Date(NaiveDate),
}

/// The network-query object derived from an applied snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterQuery {
    pub params: BTreeMap<String, QueryValue>,
    pub page: u32,
    pub page_size: u32,
}

/// Project a snapshot into a query. Empty fields never appear; the
/// projection of equal snapshots is equal.
pub fn project(state: &FilterState, specs: &[FilterFieldSpec]) -> FilterQuery {
    let mut params = BTreeMap::new();

    for spec in specs {
        let Some(value) = state.get(&spec.name) else {
            continue;
        };
        match value {
            FilterValue::Text(v) => {
                params.insert(spec.projected_key().to_string(), QueryValue::Text(v.clone()));
            }
            FilterValue::Date(d) => {
                params.insert(spec.projected_key().to_string(), QueryValue::Date(*d));
            }
            FilterValue::Single(id) => {
                params.insert(spec.projected_key().to_string(), QueryValue::Id(id.clone()));
            }
            FilterValue::Multi(ids) => {
                params.insert(
                    spec.projected_key().to_string(),
                    QueryValue::IdList(ids.clone()),
                );
            }
            FilterValue::Cascade(selection) => {
                for (level_id, selected) in selection.iter() {
                    params.insert(level_id.to_string(), QueryValue::Id(selected.to_string()));
                }
            }
        }
    }

    FilterQuery {
        params,
        page: state.page(),
        page_size: state.page_size(),
    }
}
