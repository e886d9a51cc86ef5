//! A single level in a dependency chain.
//!
//! The node owns its option list, loading status, and selected value.
//! Parent changes split into two halves: a synchronous `begin_set_parent`
//! that clears state and issues a sequence ticket, and an asynchronous
//! `run_load` that resolves the fetch and applies the staleness check
//! before committing. The split is what makes two rapid parent changes
//! safe: both synchronous halves run in call order, both fetches race, and
//! only the latest ticket's response is ever committed.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};

use crate::cache::LookupCache;
use crate::cascade::{CascadeLevelSpec, LevelStatus};
use crate::error::{LookupError, SelectError};
use crate::provider::{LookupOption, LookupProvider};
use crate::sequencer::{RequestSequencer, Ticket};

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NodeState {
    parent_value: Option<String>,
    selected_value: Option<String>,
    options: Vec<LookupOption>,
    status: LevelStatus,
    request_seq: u64,
}

impl NodeState {
    fn new() -> Self {
        Self {
            parent_value: None,
            selected_value: None,
            options: Vec::new(),
            status: LevelStatus::Idle,
            request_seq: 0,
        }
    }
}

/// Read-only copy of a node's state for rendering and assertions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeSnapshot {
    pub level_id: String,
    pub parent_value: Option<String>,
    pub selected_value: Option<String>,
    pub options: Vec<LookupOption>,
    pub status: LevelStatus,
    pub request_seq: u64,
}

/// A fetch that was issued but not yet resolved. Produced by
/// `begin_set_parent`/`begin_prime`, consumed by `run_load`.
#[derive(Debug)]
pub(crate) struct PendingLoad {
    parent_key: Option<String>,
    ticket: Ticket,
}

// ---------------------------------------------------------------------------
// CascadeNode
// ---------------------------------------------------------------------------

/// One level of a cascade chain.
///
/// `parent_value` is mutated only by the owning chain's propagation walk,
/// never by host code; hosts read snapshots and select through the chain.
pub struct CascadeNode {
    level: CascadeLevelSpec,
    slot: String,
    state: Mutex<NodeState>,
    provider: Arc<dyn LookupProvider>,
    cache: Arc<LookupCache>,
    sequencer: Arc<RequestSequencer>,
}

impl CascadeNode {
    pub(crate) fn new(
        level: CascadeLevelSpec,
        chain_id: &str,
        provider: Arc<dyn LookupProvider>,
        cache: Arc<LookupCache>,
        sequencer: Arc<RequestSequencer>,
    ) -> Self {
        let slot = format!("{}/{}", chain_id, level.id);
        Self {
            level,
            slot,
            state: Mutex::new(NodeState::new()),
            provider,
            cache,
            sequencer,
        }
    }

    pub fn level_id(&self) -> &str {
        &self.level.id
    }

    pub fn is_root(&self) -> bool {
        self.level.parent_level_id.is_none()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let st = self.state_guard();
        NodeSnapshot {
            level_id: self.level.id.clone(),
            parent_value: st.parent_value.clone(),
            selected_value: st.selected_value.clone(),
            options: st.options.clone(),
            status: st.status,
            request_seq: st.request_seq,
        }
    }

    pub fn status(&self) -> LevelStatus {
        self.state_guard().status
    }

    pub fn selected_value(&self) -> Option<String> {
        self.state_guard().selected_value.clone()
    }

    pub(crate) fn parent_value(&self) -> Option<String> {
        self.state_guard().parent_value.clone()
    }

    /// Set the selected value. `value` must be `None` or one of the current
    /// option values; anything else is a defect in the calling UI code and
    /// is rejected, never coerced.
    pub fn select(&self, value: Option<String>) -> Result<(), SelectError> {
        let mut st = self.state_guard();
        if let Some(v) = &value {
            if st.status != LevelStatus::Ready {
                let err = SelectError::NotReady {
                    level_id: self.level.id.clone(),
                    status: st.status.to_string(),
                };
                error!(level_id = %self.level.id, value = %v, %err, "select rejected");
                return Err(err);
            }
            if !st.options.iter().any(|o| &o.value == v) {
                let err = SelectError::NotInOptions {
                    level_id: self.level.id.clone(),
                    value: v.clone(),
                };
                error!(level_id = %self.level.id, value = %v, %err, "select rejected");
                return Err(err);
            }
        }
        st.selected_value = value;
        Ok(())
    }

    /// Selection path for values the caller has already validated against
    /// the current options (hydration does its own membership check).
    pub(crate) fn commit_selection(&self, value: String) {
        self.state_guard().selected_value = Some(value);
    }

    /// Synchronous half of a parent change: clear selection and options,
    /// move to `Loading`/`Idle`, and issue a superseding ticket.
    ///
    /// Returns the fetch to run when the new parent is `Some`. An unchanged
    /// parent is a no-op unless the level sits in `Error` status, which
    /// makes re-selecting the parent the retry path.
    pub(crate) fn begin_set_parent(&self, parent: Option<String>) -> Option<PendingLoad> {
        let mut st = self.state_guard();
        if st.parent_value == parent && st.status != LevelStatus::Error {
            return None;
        }

        st.parent_value = parent.clone();
        st.selected_value = None;
        st.options.clear();

        let ticket = self.sequencer.issue(&self.slot);
        st.request_seq = ticket.seq();

        match parent {
            Some(parent_key) => {
                st.status = LevelStatus::Loading;
                Some(PendingLoad {
                    parent_key: Some(parent_key),
                    ticket,
                })
            }
            None => {
                st.status = LevelStatus::Idle;
                None
            }
        }
    }

    /// Load the root level's options (parent key `None`). No-op while
    /// already loading or ready; retries from `Idle` or `Error`.
    pub(crate) async fn prime(&self) -> Result<(), LookupError> {
        let pending = {
            let mut st = self.state_guard();
            if matches!(st.status, LevelStatus::Ready | LevelStatus::Loading) {
                return Ok(());
            }
            let ticket = self.sequencer.issue(&self.slot);
            st.request_seq = ticket.seq();
            st.status = LevelStatus::Loading;
            PendingLoad {
                parent_key: None,
                ticket,
            }
        };
        self.run_load(pending).await
    }

    /// Resolve a pending fetch and commit it iff its ticket is still the
    /// latest for this level. A superseded response is dropped without
    /// touching state; a superseded failure is equally inert.
    pub(crate) async fn run_load(&self, pending: PendingLoad) -> Result<(), LookupError> {
        let PendingLoad { parent_key, ticket } = pending;

        if let Some(options) = self.cache.get(&self.level.id, parent_key.as_deref()) {
            let mut st = self.state_guard();
            if self.sequencer.is_current(&ticket) {
                debug!(level_id = %self.level.id, parent = ?parent_key, "options served from cache");
                st.options = options;
                st.status = LevelStatus::Ready;
            }
            return Ok(());
        }

        debug!(
            level_id = %self.level.id,
            parent = ?parent_key,
            seq = ticket.seq(),
            "fetching options"
        );
        match self
            .provider
            .fetch_options(&self.level.id, parent_key.as_deref())
            .await
        {
            Ok(options) => {
                // Valid data for this (level, parent) key even when the node
                // has moved on; keys are idempotent.
                self.cache
                    .insert(&self.level.id, parent_key.as_deref(), options.clone());

                let mut st = self.state_guard();
                if !self.sequencer.is_current(&ticket) {
                    return Ok(());
                }
                st.options = options;
                st.status = LevelStatus::Ready;
                Ok(())
            }
            Err(err) => {
                let mut st = self.state_guard();
                if !self.sequencer.is_current(&ticket) {
                    return Ok(());
                }
                st.status = LevelStatus::Error;
                st.options.clear();
                warn!(level_id = %self.level.id, error = %err, "option fetch failed");
                Err(err)
            }
        }
    }

    /// Detach the level entirely: no parent, no selection, no options, and
    /// any in-flight fetch superseded.
    pub(crate) fn reset(&self) {
        let mut st = self.state_guard();
        let ticket = self.sequencer.issue(&self.slot);
        st.request_seq = ticket.seq();
        st.parent_value = None;
        st.selected_value = None;
        st.options.clear();
        st.status = LevelStatus::Idle;
    }

    fn state_guard(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
