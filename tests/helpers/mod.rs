//! Shared test doubles: a lookup provider with per-key gating, failure
//! injection and fetch counting; a recording history port; a stubbed query
//! executor with the same gating controls.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use filter_cascade::{
    FilterQuery, HistoryPort, LookupError, LookupOption, LookupProvider, Page, QueryError,
    QueryExecutor,
};

type Key = (String, Option<String>);

fn key(level_id: &str, parent_id: Option<&str>) -> Key {
    (level_id.to_string(), parent_id.map(str::to_string))
}

// ---------------------------------------------------------------------------
// TestProvider
// ---------------------------------------------------------------------------

/// In-memory lookup provider with three per-key controls:
///
/// - `gate`: a fetch for the key blocks until `release` is called, which
///   lets a test decide network completion order,
/// - `fail`: the fetch returns a `LookupError`,
/// - `count`: how many fetches the key has seen.
#[derive(Default)]
pub struct TestProvider {
    table: Mutex<HashMap<Key, Vec<LookupOption>>>,
    counts: Mutex<HashMap<Key, usize>>,
    gates: Mutex<HashMap<Key, Arc<Semaphore>>>,
    failing: Mutex<HashSet<Key>>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(
        self,
        level_id: &str,
        parent_id: Option<&str>,
        options: Vec<LookupOption>,
    ) -> Self {
        self.table
            .lock()
            .unwrap()
            .insert(key(level_id, parent_id), options);
        self
    }

    /// Block fetches for this key until `release` is called.
    pub fn gate(&self, level_id: &str, parent_id: Option<&str>) {
        self.gates
            .lock()
            .unwrap()
            .insert(key(level_id, parent_id), Arc::new(Semaphore::new(0)));
    }

    /// Let one blocked (or future) fetch for this key proceed.
    pub fn release(&self, level_id: &str, parent_id: Option<&str>) {
        if let Some(gate) = self.gates.lock().unwrap().get(&key(level_id, parent_id)) {
            gate.add_permits(1);
        }
    }

    pub fn fail(&self, level_id: &str, parent_id: Option<&str>) {
        self.failing.lock().unwrap().insert(key(level_id, parent_id));
    }

    pub fn recover(&self, level_id: &str, parent_id: Option<&str>) {
        self.failing
            .lock()
            .unwrap()
            .remove(&key(level_id, parent_id));
    }

    pub fn count(&self, level_id: &str, parent_id: Option<&str>) -> usize {
        self.counts
            .lock()
            .unwrap()
            .get(&key(level_id, parent_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl LookupProvider for TestProvider {
    async fn fetch_options(
        &self,
        level_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<LookupOption>, LookupError> {
        let k = key(level_id, parent_id);
        *self.counts.lock().unwrap().entry(k.clone()).or_insert(0) += 1;

        let gate = self.gates.lock().unwrap().get(&k).cloned();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if self.failing.lock().unwrap().contains(&k) {
            return Err(LookupError::new(level_id, "lookup backend unavailable"));
        }

        Ok(self
            .table
            .lock()
            .unwrap()
            .get(&k)
            .cloned()
            .unwrap_or_default())
    }
}

/// The geography fixture used across the integration tests.
pub fn geo_provider() -> TestProvider {
    TestProvider::new()
        .with_options(
            "country",
            None,
            vec![
                LookupOption::new("TR", "Turkey"),
                LookupOption::new("US", "United States"),
            ],
        )
        .with_options(
            "city",
            Some("TR"),
            vec![
                LookupOption::new("ANK", "Ankara"),
                LookupOption::new("IST", "Istanbul"),
            ],
        )
        .with_options(
            "city",
            Some("US"),
            vec![
                LookupOption::new("NYC", "New York"),
                LookupOption::new("SFO", "San Francisco"),
            ],
        )
        .with_options(
            "county",
            Some("ANK"),
            vec![LookupOption::new("CANKAYA", "Çankaya")],
        )
        .with_options(
            "district",
            Some("CANKAYA"),
            vec![LookupOption::new("KIZILAY", "Kızılay")],
        )
}

// ---------------------------------------------------------------------------
// RecordingHistory
// ---------------------------------------------------------------------------

/// History port that starts at a fixed URL and records every replacement.
#[derive(Default)]
pub struct RecordingHistory {
    url: Mutex<String>,
    replaced: Mutex<Vec<String>>,
}

impl RecordingHistory {
    pub fn at(url: &str) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            replaced: Mutex::new(Vec::new()),
        }
    }

    pub fn replacements(&self) -> Vec<String> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn last_replacement(&self) -> Option<String> {
        self.replaced.lock().unwrap().last().cloned()
    }
}

impl HistoryPort for RecordingHistory {
    fn read_current_url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    fn replace_url(&self, query: &str) {
        *self.url.lock().unwrap() = format!("?{query}");
        self.replaced.lock().unwrap().push(query.to_string());
    }
}

// ---------------------------------------------------------------------------
// StubQueryExecutor
// ---------------------------------------------------------------------------

/// Query executor answering a fixed page, with the same gate/fail controls
/// as the provider and a log of executed queries.
#[derive(Default)]
pub struct StubQueryExecutor {
    page: Mutex<Page>,
    calls: Mutex<Vec<FilterQuery>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    failing: Mutex<bool>,
}

impl StubQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: Page) -> Self {
        *self.page.lock().unwrap() = page;
        self
    }

    pub fn gate(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<FilterQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for StubQueryExecutor {
    async fn run_query(&self, query: &FilterQuery) -> Result<Page, QueryError> {
        self.calls.lock().unwrap().push(query.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if *self.failing.lock().unwrap() {
            return Err(QueryError::new("list query backend unavailable"));
        }

        Ok(self.page.lock().unwrap().clone())
    }
}

/// Initialize tracing once per test binary; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
