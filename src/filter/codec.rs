//! Bidirectional mapping between `FilterState` and the URL query string.
//!
//! Pure, total functions: encoding never fails, and decoding drops what it
//! cannot read — unknown parameters, malformed dates, empty ids — instead
//! of erroring. Ids decoded from a URL are opaque drafts until cascade
//! hydration confirms they still exist upstream.
//!
//! Canonical form: empty/default fields are omitted, list values are
//! comma-joined, dates are ISO `YYYY-MM-DD`, cascade levels are one
//! parameter per level keyed by level id, and `page` appears only past the
//! first page. `decode(encode(s))` equals `normalize(s)`.

use chrono::NaiveDate;
use url::form_urlencoded;

use crate::cascade::CascadeSelection;
use crate::filter::state::{FieldKind, FilterFieldSpec, FilterState, FilterValue};

const PAGE_PARAM: &str = "page";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize a snapshot to a query string (no leading `?`).
pub fn encode(state: &FilterState, specs: &[FilterFieldSpec]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    for spec in specs {
        let Some(value) = state.get(&spec.name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match value {
            FilterValue::Text(v) => {
                serializer.append_pair(&spec.name, v);
            }
            FilterValue::Date(d) => {
                serializer.append_pair(&spec.name, &d.format(DATE_FORMAT).to_string());
            }
            FilterValue::Single(id) => {
                serializer.append_pair(&spec.name, id);
            }
            FilterValue::Multi(ids) => {
                serializer.append_pair(&spec.name, &ids.join(","));
            }
            FilterValue::Cascade(selection) => {
                for (level_id, selected) in selection.iter() {
                    serializer.append_pair(level_id, selected);
                }
            }
        }
    }

    if state.page() > 1 {
        serializer.append_pair(PAGE_PARAM, &state.page().to_string());
    }

    serializer.finish()
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Parse a URL or bare query string into a draft snapshot.
///
/// Tolerates partial, reordered, and duplicated parameters (last wins).
/// Page size is never URL state and stays at its default.
pub fn decode(raw: &str, specs: &[FilterFieldSpec]) -> FilterState {
    let query = query_portion(raw);
    let mut state = FilterState::new();
    let mut page: u32 = 1;

    // Raw values per parameter name, last occurrence winning.
    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value.into_owned(),
            None => params.push((key.into_owned(), value.into_owned())),
        }
    }

    for spec in specs {
        match &spec.kind {
            FieldKind::Text => {
                if let Some(v) = param(&params, &spec.name) {
                    state = state.with_field(&spec.name, FilterValue::Text(v.to_string()));
                }
            }
            FieldKind::Date => {
                if let Some(v) = param(&params, &spec.name) {
                    if let Ok(date) = NaiveDate::parse_from_str(v, DATE_FORMAT) {
                        state = state.with_field(&spec.name, FilterValue::Date(date));
                    }
                }
            }
            FieldKind::Single => {
                if let Some(v) = param(&params, &spec.name) {
                    state = state.with_field(&spec.name, FilterValue::Single(v.to_string()));
                }
            }
            FieldKind::Multi => {
                if let Some(v) = param(&params, &spec.name) {
                    let ids: Vec<String> = v
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect();
                    state = state.with_field(&spec.name, FilterValue::Multi(ids));
                }
            }
            FieldKind::Cascade { levels, .. } => {
                let mut selection = CascadeSelection::new();
                for level_id in levels {
                    if let Some(v) = param(&params, level_id) {
                        selection.set(level_id.clone(), v.to_string());
                    }
                }
                state = state.with_field(&spec.name, FilterValue::Cascade(selection));
            }
        }
    }

    if let Some(v) = param(&params, PAGE_PARAM) {
        if let Ok(p) = v.parse::<u32>() {
            page = p.max(1);
        }
    }

    state.with_page(page)
}

/// Canonical form of a snapshot: known fields only, empty values dropped,
/// cascade entries reordered to their declared level order, page size at
/// its default. This is exactly what survives a URL round trip.
pub fn normalize(state: &FilterState, specs: &[FilterFieldSpec]) -> FilterState {
    let mut out = FilterState::new().with_page(state.page());

    for spec in specs {
        let Some(value) = state.get(&spec.name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let value = match (&spec.kind, value) {
            (FieldKind::Cascade { levels, .. }, FilterValue::Cascade(selection)) => {
                let mut ordered = CascadeSelection::new();
                for level_id in levels {
                    if let Some(v) = selection.get(level_id) {
                        ordered.set(level_id.clone(), v.to_string());
                    }
                }
                FilterValue::Cascade(ordered)
            }
            (_, value) => value.clone(),
        };
        out = out.with_field(&spec.name, value);
    }

    out
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn query_portion(raw: &str) -> &str {
    let without_fragment = raw.split('#').next().unwrap_or("");
    match without_fragment.find('?') {
        Some(i) => &without_fragment[i + 1..],
        None => without_fragment,
    }
}
