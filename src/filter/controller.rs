//! The per-screen orchestrator.
//!
//! Owns the committed `FilterState` and the screen's cascade chains, and
//! keeps three representations of "what is filtered" consistent: the
//! in-memory snapshot, the URL query string, and the in-flight query.
//!
//! ```text
//! mount:  HistoryPort ──decode──► draft ──hydrate chains──► committed
//! edit:   update_field ──► new snapshot (cascade edits via chain)
//! apply:  committed ──encode──► replace_url
//!                  ──project──► FilterQuery ──run_query──► Page
//! ```
//!
//! Hydration runs independent chains concurrently and levels within one
//! chain strictly in order. An `apply()` supersedes the previous apply's
//! query: a response landing for an older apply ticket is dropped, never
//! committed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::LookupCache;
use crate::cascade::{
    CascadeChain, CascadeLevelSpec, CascadeSelection, ChainError, ChainSnapshot, HydrationHalt,
    HydrationOutcome,
};
use crate::error::{FieldError, QueryError, SetupError};
use crate::filter::state::{FieldKind, FilterFieldSpec, FilterState, FilterValue};
use crate::filter::{codec, projection, FilterQuery};
use crate::provider::{HistoryPort, LookupProvider, Page, QueryExecutor};
use crate::sequencer::{RequestSequencer, Ticket};

const APPLY_SLOT: &str = "apply";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What happens once URL hydration settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HydrationPolicy {
    /// Hydration ends in a committed but not submitted state; the host
    /// decides when to apply.
    #[default]
    CommitOnly,
    /// Hydration is followed by an `apply()`, for screens that search as
    /// soon as they land on a shared URL.
    CommitAndApply,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub hydration: HydrationPolicy,
    pub page_size: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hydration: HydrationPolicy::CommitOnly,
            page_size: FilterState::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ControllerConfig {
    pub fn with_hydration(mut self, hydration: HydrationPolicy) -> Self {
        self.hydration = hydration;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Screen configuration
// ---------------------------------------------------------------------------

/// One cascade chain a screen owns.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub id: String,
    pub levels: Vec<CascadeLevelSpec>,
}

impl ChainSpec {
    pub fn new(id: impl Into<String>, levels: Vec<CascadeLevelSpec>) -> Self {
        Self {
            id: id.into(),
            levels,
        }
    }
}

/// Everything a screen declares about its filters.
#[derive(Debug, Clone, Default)]
pub struct ScreenSpec {
    pub fields: Vec<FilterFieldSpec>,
    pub chains: Vec<ChainSpec>,
}

impl ScreenSpec {
    pub fn new(fields: Vec<FilterFieldSpec>, chains: Vec<ChainSpec>) -> Self {
        Self { fields, chains }
    }
}

// ---------------------------------------------------------------------------
// Edits, notifications, reports
// ---------------------------------------------------------------------------

/// One user edit against a filter field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Text(String),
    Date(Option<NaiveDate>),
    Single(Option<String>),
    Multi(Vec<String>),
    /// Select (or clear) one level of a cascade field; descendants follow.
    CascadeSelect {
        level_id: String,
        value: Option<String>,
    },
}

impl FieldEdit {
    fn name(&self) -> &'static str {
        match self {
            FieldEdit::Text(_) => "text",
            FieldEdit::Date(_) => "date",
            FieldEdit::Single(_) => "single-select",
            FieldEdit::Multi(_) => "multi-select",
            FieldEdit::CascadeSelect { .. } => "cascade",
        }
    }
}

/// Transient, user-facing message. The controller buffers these; hosts
/// drain them into their notification layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    LookupFailed {
        chain_id: String,
        level_id: String,
        message: String,
    },
    QueryFailed {
        message: String,
    },
}

/// What `init_from_url` settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct HydrationReport {
    /// The committed snapshot after all chains settled.
    pub state: FilterState,
    /// Per-chain hydration outcome (partial outcomes included).
    pub chains: BTreeMap<String, HydrationOutcome>,
    /// The query emitted when the hydration policy auto-applies.
    pub applied: Option<FilterQuery>,
}

// ---------------------------------------------------------------------------
// FilterController
// ---------------------------------------------------------------------------

pub struct FilterController {
    config: ControllerConfig,
    specs: Vec<FilterFieldSpec>,
    chains: HashMap<String, Arc<CascadeChain>>,
    committed: FilterState,
    history: Arc<dyn HistoryPort>,
    executor: Arc<dyn QueryExecutor>,
    sequencer: Arc<RequestSequencer>,
    cache: Arc<LookupCache>,
    apply_ticket: Mutex<Option<Ticket>>,
    notifications: Mutex<Vec<Notification>>,
}

impl std::fmt::Debug for FilterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterController")
            .field("specs", &self.specs.len())
            .field("chains", &self.chains.len())
            .finish()
    }
}

impl FilterController {
    /// Wire a screen together, validating its configuration up front.
    pub fn new(
        screen: ScreenSpec,
        provider: Arc<dyn LookupProvider>,
        history: Arc<dyn HistoryPort>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self, SetupError> {
        for (i, field) in screen.fields.iter().enumerate() {
            if screen.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SetupError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }

        let sequencer = Arc::new(RequestSequencer::new());
        let cache = Arc::new(LookupCache::new());

        let mut chains: HashMap<String, Arc<CascadeChain>> = HashMap::new();
        for chain_spec in screen.chains {
            if chains.contains_key(&chain_spec.id) {
                return Err(SetupError::DuplicateChain {
                    chain_id: chain_spec.id,
                });
            }
            let chain = CascadeChain::new(
                chain_spec.id.clone(),
                chain_spec.levels,
                Arc::clone(&provider),
                Arc::clone(&cache),
                Arc::clone(&sequencer),
            )?;
            chains.insert(chain_spec.id, Arc::new(chain));
        }

        for field in &screen.fields {
            if let FieldKind::Cascade { chain_id, levels } = &field.kind {
                let chain = chains.get(chain_id).ok_or_else(|| SetupError::UnknownChain {
                    name: field.name.clone(),
                    chain_id: chain_id.clone(),
                })?;
                let actual = chain.level_ids();
                if *levels != actual {
                    return Err(SetupError::LevelMismatch {
                        name: field.name.clone(),
                        chain_id: chain_id.clone(),
                        declared: levels.clone(),
                        actual,
                    });
                }
            }
        }

        let config = ControllerConfig::default();
        let committed = FilterState::new().with_page_size(config.page_size);
        Ok(Self {
            config,
            specs: screen.fields,
            chains,
            committed,
            history,
            executor,
            sequencer,
            cache,
            apply_ticket: Mutex::new(None),
            notifications: Mutex::new(Vec::new()),
        })
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.committed = FilterState::new().with_page_size(config.page_size);
        self.config = config;
        self
    }

    /// The committed snapshot.
    pub fn state(&self) -> &FilterState {
        &self.committed
    }

    /// Render-ready view of one chain.
    pub fn chain_snapshot(&self, chain_id: &str) -> Option<ChainSnapshot> {
        self.chains.get(chain_id).map(|c| c.snapshot())
    }

    /// Drain buffered user-facing messages.
    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.notifications.lock().unwrap_or_else(|e| e.into_inner()))
    }

    // -----------------------------------------------------------------------
    // Mount
    // -----------------------------------------------------------------------

    /// Decode the current URL and settle every chain against live reference
    /// data. Independent chains hydrate concurrently; levels within one
    /// chain strictly in order. Chains the URL does not mention are still
    /// primed so their root options are ready.
    pub async fn init_from_url(&mut self) -> HydrationReport {
        let raw = self.history.read_current_url();
        let draft = codec::decode(&raw, &self.specs);
        debug!(url = %raw, "hydrating from url");

        // Desired selection per chain, empty for unmentioned chains.
        let mut desired: HashMap<String, CascadeSelection> = HashMap::new();
        for spec in &self.specs {
            if let FieldKind::Cascade { chain_id, .. } = &spec.kind {
                let selection = match draft.get(&spec.name) {
                    Some(FilterValue::Cascade(sel)) => sel.clone(),
                    _ => CascadeSelection::new(),
                };
                desired.insert(chain_id.clone(), selection);
            }
        }

        let jobs = self.chains.iter().map(|(chain_id, chain)| {
            let chain = Arc::clone(chain);
            let values = desired.remove(chain_id).unwrap_or_default();
            let chain_id = chain_id.clone();
            async move {
                let outcome = chain.hydrate(&values).await;
                (chain_id, outcome)
            }
        });
        let outcomes: BTreeMap<String, HydrationOutcome> = join_all(jobs).await.into_iter().collect();

        for (chain_id, outcome) in &outcomes {
            if let Some(HydrationHalt::Fetch(err)) = &outcome.halt {
                self.notify(Notification::LookupFailed {
                    chain_id: chain_id.clone(),
                    level_id: err.level_id.clone(),
                    message: err.message.clone(),
                });
            }
        }

        // Reconcile: leaf fields from the draft, cascade fields from what
        // the chains actually confirmed.
        let mut state = FilterState::new()
            .with_page_size(self.config.page_size)
            .with_page(draft.page());
        for spec in &self.specs {
            match &spec.kind {
                FieldKind::Cascade { chain_id, .. } => {
                    if let Some(chain) = self.chains.get(chain_id) {
                        state =
                            state.with_field(&spec.name, FilterValue::Cascade(chain.selection()));
                    }
                }
                _ => {
                    if let Some(value) = draft.get(&spec.name) {
                        state = state.with_field(&spec.name, value.clone());
                    }
                }
            }
        }
        self.committed = state;

        let applied = match self.config.hydration {
            HydrationPolicy::CommitAndApply => Some(self.apply()),
            HydrationPolicy::CommitOnly => None,
        };

        info!(
            fields = self.committed.fields().count(),
            chains = outcomes.len(),
            "hydration committed"
        );
        HydrationReport {
            state: self.committed.clone(),
            chains: outcomes,
            applied,
        }
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Apply one user edit. Leaf fields commit synchronously; cascade
    /// fields go through the chain and commit what the chain settled on.
    /// Any field edit returns the state to the first page.
    pub async fn update_field(&mut self, name: &str, edit: FieldEdit) -> Result<(), FieldError> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| FieldError::UnknownField {
                name: name.to_string(),
            })?
            .clone();

        let next = match (&spec.kind, edit) {
            (FieldKind::Text, FieldEdit::Text(v)) => {
                self.committed.clone().with_field(name, FilterValue::Text(v))
            }
            (FieldKind::Date, FieldEdit::Date(Some(d))) => {
                self.committed.clone().with_field(name, FilterValue::Date(d))
            }
            (FieldKind::Date, FieldEdit::Date(None)) => self.committed.clone().without_field(name),
            (FieldKind::Single, FieldEdit::Single(Some(id))) => self
                .committed
                .clone()
                .with_field(name, FilterValue::Single(id)),
            (FieldKind::Single, FieldEdit::Single(None)) => {
                self.committed.clone().without_field(name)
            }
            (FieldKind::Multi, FieldEdit::Multi(ids)) => self
                .committed
                .clone()
                .with_field(name, FilterValue::Multi(ids)),
            (FieldKind::Cascade { chain_id, .. }, FieldEdit::CascadeSelect { level_id, value }) => {
                let chain = Arc::clone(self.chains.get(chain_id).ok_or_else(|| {
                    FieldError::UnknownField {
                        name: name.to_string(),
                    }
                })?);
                match chain.select(&level_id, value).await {
                    Ok(()) => {}
                    Err(ChainError::Select(err)) => return Err(err.into()),
                    Err(ChainError::Lookup(err)) => {
                        // Non-fatal: the selection stands, the failed level
                        // sits in error status until retried.
                        self.notify(Notification::LookupFailed {
                            chain_id: chain_id.clone(),
                            level_id: err.level_id.clone(),
                            message: err.message.clone(),
                        });
                    }
                }
                self.committed
                    .clone()
                    .with_field(name, FilterValue::Cascade(chain.selection()))
            }
            (kind, edit) => {
                return Err(FieldError::KindMismatch {
                    name: name.to_string(),
                    expected: kind.name(),
                    given: edit.name(),
                });
            }
        };

        self.committed = next.with_page(1);
        Ok(())
    }

    /// Move to another page of the current result set. Unlike field edits
    /// this does not reset pagination.
    pub fn set_page(&mut self, page: u32) {
        self.committed = self.committed.clone().with_page(page);
    }

    // -----------------------------------------------------------------------
    // Apply / query / reset
    // -----------------------------------------------------------------------

    /// Make "what the user sees" and "what is searched for" the same
    /// thing: push the committed snapshot into the URL (no navigation) and
    /// return its query projection. Supersedes any unresolved earlier
    /// apply. Idempotent without intervening edits.
    pub fn apply(&self) -> FilterQuery {
        let query_string = codec::encode(&self.committed, &self.specs);
        self.history.replace_url(&query_string);

        let ticket = self.sequencer.issue(APPLY_SLOT);
        *self
            .apply_ticket
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(ticket);

        info!(query = %query_string, "filters applied");
        projection::project(&self.committed, &self.specs)
    }

    /// Execute the screen's primary list query. Returns `Ok(None)` when the
    /// response arrives for a superseded apply — expected behavior, the
    /// caller simply ignores it.
    pub async fn run_query(&self, query: &FilterQuery) -> Result<Option<Page>, QueryError> {
        let ticket = {
            let mut slot = self
                .apply_ticket
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            slot.get_or_insert_with(|| self.sequencer.issue(APPLY_SLOT))
                .clone()
        };

        match self.executor.run_query(query).await {
            Ok(page) => {
                if self.sequencer.is_current(&ticket) {
                    Ok(Some(page))
                } else {
                    Ok(None)
                }
            }
            Err(err) => {
                if !self.sequencer.is_current(&ticket) {
                    return Ok(None);
                }
                warn!(error = %err, "list query failed");
                self.notify(Notification::QueryFailed {
                    message: err.message.clone(),
                });
                Err(err)
            }
        }
    }

    /// `apply()` then `run_query()` in one step.
    pub async fn apply_and_run(&self) -> Result<Option<Page>, QueryError> {
        let query = self.apply();
        self.run_query(&query).await
    }

    /// Restore field defaults, reset every chain, and apply.
    pub async fn reset(&mut self) -> FilterQuery {
        self.committed = FilterState::new().with_page_size(self.config.page_size);
        for (chain_id, chain) in &self.chains {
            if let Err(err) = chain.reset().await {
                self.notify(Notification::LookupFailed {
                    chain_id: chain_id.clone(),
                    level_id: err.level_id.clone(),
                    message: err.message.clone(),
                });
            }
        }
        self.apply()
    }

    /// Drop cached reference data so the next walk refetches it.
    pub fn clear_lookup_cache(&self) {
        self.cache.clear();
    }

    fn notify(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}
