//! An ordered sequence of cascade levels.
//!
//! The chain owns propagation: after a selection at level *i*, level *i+1*
//! gets the new parent (one awaited fetch at most) and every deeper level
//! collapses to idle synchronously, because its own parent's selection was
//! just cleared. Walks are serialized per chain by a propagation token so
//! rapid selects against different ancestors cannot interleave their state
//! mutations; the fetches themselves race freely and the sequence tickets
//! decide the winner.
//!
//! Quiescent invariant, restored at the end of every public operation: for
//! adjacent levels, `child.parent_value == parent.selected_value`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::LookupCache;
use crate::cascade::node::{CascadeNode, NodeSnapshot};
use crate::cascade::{CascadeLevelSpec, CascadeSelection, LevelStatus};
use crate::error::{LookupError, SelectError, SetupError};
use crate::provider::LookupProvider;
use crate::sequencer::RequestSequencer;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Error from a chain operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Where and why hydration stopped early.
///
/// Neither variant is a chain failure: `OptionMissing` means an externally
/// stored id no longer resolves against live reference data (stale or
/// deleted upstream) and the selection legitimately ends one level higher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationHalt {
    /// The stored id for `level_id` is absent from the freshly fetched
    /// options; this level and all descendants remain unselected.
    OptionMissing { level_id: String, value: String },

    /// A level's option fetch failed; the level stays in `Error` status.
    Fetch(LookupError),
}

/// Result of resolving a stored selection against live reference data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationOutcome {
    /// Levels resolved and selected, in chain order.
    pub resolved: Vec<(String, String)>,
    /// Set when hydration stopped before consuming every supplied value.
    pub halt: Option<HydrationHalt>,
}

impl HydrationOutcome {
    pub fn is_partial(&self) -> bool {
        self.halt.is_some()
    }
}

/// Read-only copy of the whole chain for rendering and assertions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChainSnapshot {
    pub chain_id: String,
    pub levels: Vec<NodeSnapshot>,
}

// ---------------------------------------------------------------------------
// CascadeChain
// ---------------------------------------------------------------------------

pub struct CascadeChain {
    id: String,
    nodes: Vec<Arc<CascadeNode>>,
    /// One propagation walk at a time per chain instance.
    propagation: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CascadeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeChain")
            .field("id", &self.id)
            .field("levels", &self.nodes.len())
            .finish()
    }
}

impl CascadeChain {
    /// Build a chain, validating that the levels form a single linked line:
    /// the first level is a root and every subsequent level names its
    /// predecessor as parent.
    pub fn new(
        id: impl Into<String>,
        levels: Vec<CascadeLevelSpec>,
        provider: Arc<dyn LookupProvider>,
        cache: Arc<LookupCache>,
        sequencer: Arc<RequestSequencer>,
    ) -> Result<Self, SetupError> {
        let id = id.into();

        let first = levels.first().ok_or_else(|| SetupError::EmptyChain {
            chain_id: id.clone(),
        })?;
        if let Some(parent) = &first.parent_level_id {
            return Err(SetupError::RootHasParent {
                chain_id: id.clone(),
                level_id: format!("{} (parent '{}')", first.id, parent),
            });
        }
        for window in levels.windows(2) {
            let expected = &window[0].id;
            let level = &window[1];
            match &level.parent_level_id {
                Some(declared) if declared == expected => {}
                declared => {
                    return Err(SetupError::BrokenLink {
                        chain_id: id.clone(),
                        level_id: level.id.clone(),
                        declared: declared.clone().unwrap_or_default(),
                        expected: expected.clone(),
                    });
                }
            }
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].iter().any(|l| l.id == level.id) {
                return Err(SetupError::DuplicateLevel {
                    chain_id: id.clone(),
                    level_id: level.id.clone(),
                });
            }
        }

        let nodes = levels
            .into_iter()
            .map(|level| {
                Arc::new(CascadeNode::new(
                    level,
                    &id,
                    Arc::clone(&provider),
                    Arc::clone(&cache),
                    Arc::clone(&sequencer),
                ))
            })
            .collect();

        Ok(Self {
            id,
            nodes,
            propagation: tokio::sync::Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn level_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.level_id().to_string()).collect()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain_id: self.id.clone(),
            levels: self.nodes.iter().map(|n| n.snapshot()).collect(),
        }
    }

    pub fn level(&self, level_id: &str) -> Option<NodeSnapshot> {
        self.index_of(level_id).map(|i| self.nodes[i].snapshot())
    }

    /// The selected prefix of the chain, root downward.
    pub fn selection(&self) -> CascadeSelection {
        let mut selection = CascadeSelection::new();
        for node in &self.nodes {
            match node.selected_value() {
                Some(value) => selection.set(node.level_id(), value),
                None => break,
            }
        }
        selection
    }

    /// No fetch in flight and no propagation walk pending.
    pub fn is_quiescent(&self) -> bool {
        self.propagation.try_lock().is_ok()
            && self
                .nodes
                .iter()
                .all(|n| n.status() != LevelStatus::Loading)
    }

    /// Load the root level's options. Idempotent; a cache hit makes the
    /// repeat walk free.
    pub async fn prime(&self) -> Result<(), LookupError> {
        let _token = self.propagation.lock().await;
        self.nodes[0].prime().await
    }

    /// Select a value at one level and propagate: the immediate child gets
    /// the new parent (its fetch is awaited here), deeper levels collapse
    /// to idle synchronously.
    pub async fn select(&self, level_id: &str, value: Option<String>) -> Result<(), ChainError> {
        let idx = self.index_of(level_id).ok_or(SelectError::UnknownLevel {
            level_id: level_id.to_string(),
        })?;

        let loads = {
            let _token = self.propagation.lock().await;
            self.nodes[idx].select(value)?;
            self.walk_down(idx)
        };

        debug!(chain_id = %self.id, level_id, "selection propagated");
        let mut failure = None;
        for (child, pending) in loads {
            if let Err(err) = self.nodes[child].run_load(pending).await {
                failure.get_or_insert(err);
            }
        }
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Rebuild a selection from externally stored ids, level by level.
    ///
    /// Each level's option list is resolved in order, and the stored id is
    /// verified against the freshly fetched options before descending.
    /// A missing id halts the walk — descendants stay unselected, the
    /// prefix above stays selected and usable. Never guesses a value.
    pub async fn hydrate(&self, values: &CascadeSelection) -> HydrationOutcome {
        let _token = self.propagation.lock().await;
        let mut outcome = HydrationOutcome::default();

        if let Err(err) = self.nodes[0].prime().await {
            outcome.halt = Some(HydrationHalt::Fetch(err));
            self.detach_stale_descendants();
            return outcome;
        }

        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            let Some(desired) = values.get(node.level_id()) else {
                break;
            };

            let in_options = node
                .snapshot()
                .options
                .iter()
                .any(|o| o.value == desired);
            if !in_options {
                warn!(
                    chain_id = %self.id,
                    level_id = %node.level_id(),
                    value = %desired,
                    "hydration halted: stored id absent from live options"
                );
                outcome.halt = Some(HydrationHalt::OptionMissing {
                    level_id: node.level_id().to_string(),
                    value: desired.to_string(),
                });
                break;
            }

            node.commit_selection(desired.to_string());
            outcome
                .resolved
                .push((node.level_id().to_string(), desired.to_string()));

            if let Some(child) = self.nodes.get(i + 1) {
                if let Some(pending) = child.begin_set_parent(Some(desired.to_string())) {
                    if let Err(err) = child.run_load(pending).await {
                        outcome.halt = Some(HydrationHalt::Fetch(err));
                        break;
                    }
                }
            }
        }

        self.detach_stale_descendants();
        info!(
            chain_id = %self.id,
            resolved = outcome.resolved.len(),
            partial = outcome.is_partial(),
            "hydration settled"
        );
        outcome
    }

    /// Clear every level and reload the root.
    pub async fn reset(&self) -> Result<(), LookupError> {
        let _token = self.propagation.lock().await;
        for node in &self.nodes {
            node.reset();
        }
        self.nodes[0].prime().await
    }

    fn index_of(&self, level_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.level_id() == level_id)
    }

    /// Synchronous propagation walk from `idx` downward. In practice at
    /// most one fetch results (the immediate child of the level that gained
    /// a selection); every deeper level is detached because its parent's
    /// selection was cleared in the same walk.
    fn walk_down(&self, idx: usize) -> Vec<(usize, crate::cascade::node::PendingLoad)> {
        let mut loads = Vec::new();
        for i in idx..self.nodes.len().saturating_sub(1) {
            let parent_selected = self.nodes[i].selected_value();
            let child = &self.nodes[i + 1];
            if let Some(pending) = child.begin_set_parent(parent_selected) {
                loads.push((i + 1, pending));
            }
        }
        debug_assert!(loads.len() <= 1);
        loads
    }

    /// Restore the quiescent invariant after hydration: any level whose
    /// parent lost its selection is detached. Purely synchronous.
    fn detach_stale_descendants(&self) {
        for i in 0..self.nodes.len().saturating_sub(1) {
            let parent_selected = self.nodes[i].selected_value();
            let child = &self.nodes[i + 1];
            if parent_selected.is_none() && child.parent_value().is_some() {
                child.begin_set_parent(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LookupOption, StaticLookupProvider};

    fn geo_provider() -> Arc<StaticLookupProvider> {
        Arc::new(
            StaticLookupProvider::new()
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
                ),
        )
    }

    fn geo_levels() -> Vec<CascadeLevelSpec> {
        vec![
            CascadeLevelSpec::root("country"),
            CascadeLevelSpec::child("city", "country"),
            CascadeLevelSpec::child("county", "city"),
        ]
    }

    fn geo_chain() -> CascadeChain {
        CascadeChain::new(
            "home",
            geo_levels(),
            geo_provider(),
            Arc::new(LookupCache::new()),
            Arc::new(RequestSequencer::new()),
        )
        .unwrap()
    }

    fn assert_quiescent_invariant(chain: &CascadeChain) {
        let snap = chain.snapshot();
        for pair in snap.levels.windows(2) {
            assert_eq!(
                pair[1].parent_value, pair[0].selected_value,
                "child '{}' parent out of sync with '{}'",
                pair[1].level_id, pair[0].level_id
            );
        }
    }

    #[test]
    fn test_new_rejects_broken_link() {
        let levels = vec![
            CascadeLevelSpec::root("country"),
            CascadeLevelSpec::child("city", "region"),
        ];
        let err = CascadeChain::new(
            "home",
            levels,
            geo_provider(),
            Arc::new(LookupCache::new()),
            Arc::new(RequestSequencer::new()),
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::BrokenLink { .. }));
    }

    #[test]
    fn test_new_rejects_parented_root() {
        let levels = vec![CascadeLevelSpec::child("city", "country")];
        let err = CascadeChain::new(
            "home",
            levels,
            geo_provider(),
            Arc::new(LookupCache::new()),
            Arc::new(RequestSequencer::new()),
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::RootHasParent { .. }));
    }

    #[tokio::test]
    async fn test_select_loads_child_and_detaches_deeper() {
        let chain = geo_chain();
        chain.prime().await.unwrap();

        chain
            .select("country", Some("TR".to_string()))
            .await
            .unwrap();

        let snap = chain.snapshot();
        assert_eq!(snap.levels[1].status, LevelStatus::Ready);
        assert_eq!(snap.levels[1].options.len(), 2);
        assert_eq!(snap.levels[2].status, LevelStatus::Idle);
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_ancestor_change_clears_descendants() {
        let chain = geo_chain();
        chain.prime().await.unwrap();
        chain
            .select("country", Some("TR".to_string()))
            .await
            .unwrap();
        chain.select("city", Some("ANK".to_string())).await.unwrap();
        chain
            .select("county", Some("CANKAYA".to_string()))
            .await
            .unwrap();

        chain
            .select("country", Some("US".to_string()))
            .await
            .unwrap();

        let snap = chain.snapshot();
        assert_eq!(snap.levels[0].selected_value.as_deref(), Some("US"));
        assert!(snap.levels[1].selected_value.is_none());
        assert_eq!(snap.levels[1].options[0].value, "NYC");
        assert_eq!(snap.levels[2].status, LevelStatus::Idle);
        assert!(snap.levels[2].selected_value.is_none());
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_deselect_collapses_chain() {
        let chain = geo_chain();
        chain.prime().await.unwrap();
        chain
            .select("country", Some("TR".to_string()))
            .await
            .unwrap();
        chain.select("city", Some("ANK".to_string())).await.unwrap();

        chain.select("country", None).await.unwrap();

        let snap = chain.snapshot();
        assert!(snap.levels[0].selected_value.is_none());
        assert_eq!(snap.levels[1].status, LevelStatus::Idle);
        assert_eq!(snap.levels[2].status, LevelStatus::Idle);
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_select_unknown_level_fails() {
        let chain = geo_chain();
        let err = chain
            .select("region", Some("X".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Select(SelectError::UnknownLevel { .. })
        ));
    }

    #[tokio::test]
    async fn test_hydrate_full_path() {
        let chain = geo_chain();
        let values = CascadeSelection::new()
            .with("country", "TR")
            .with("city", "ANK")
            .with("county", "CANKAYA");

        let outcome = chain.hydrate(&values).await;

        assert!(!outcome.is_partial());
        assert_eq!(outcome.resolved.len(), 3);
        assert_eq!(chain.selection(), values);
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_hydrate_halts_on_missing_value() {
        let chain = geo_chain();
        // "IZM" is not among TR's cities.
        let values = CascadeSelection::new()
            .with("country", "TR")
            .with("city", "IZM");

        let outcome = chain.hydrate(&values).await;

        assert!(matches!(
            outcome.halt,
            Some(HydrationHalt::OptionMissing { ref level_id, .. }) if level_id == "city"
        ));
        let snap = chain.snapshot();
        assert_eq!(snap.levels[0].selected_value.as_deref(), Some("TR"));
        assert!(snap.levels[1].selected_value.is_none());
        // City options for TR stay usable for manual drill-down.
        assert_eq!(snap.levels[1].status, LevelStatus::Ready);
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_hydrate_empty_primes_root_only() {
        let chain = geo_chain();
        let outcome = chain.hydrate(&CascadeSelection::new()).await;

        assert!(!outcome.is_partial());
        assert!(outcome.resolved.is_empty());
        let snap = chain.snapshot();
        assert_eq!(snap.levels[0].status, LevelStatus::Ready);
        assert_eq!(snap.levels[1].status, LevelStatus::Idle);
    }

    #[tokio::test]
    async fn test_hydrate_uses_cache_on_rewalk() {
        let provider = geo_provider();
        let cache = Arc::new(LookupCache::new());
        let chain = CascadeChain::new(
            "home",
            geo_levels(),
            Arc::clone(&provider) as Arc<dyn LookupProvider>,
            Arc::clone(&cache),
            Arc::new(RequestSequencer::new()),
        )
        .unwrap();

        let values = CascadeSelection::new()
            .with("country", "TR")
            .with("city", "ANK");
        chain.hydrate(&values).await;
        assert_eq!(cache.len(), 3); // country root, TR cities, ANK counties

        // A second walk over the same path is pure cache hits.
        chain.reset().await.unwrap();
        let outcome = chain.hydrate(&values).await;
        assert!(!outcome.is_partial());
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_reset_clears_selection_and_reprimes() {
        let chain = geo_chain();
        chain.prime().await.unwrap();
        chain
            .select("country", Some("TR".to_string()))
            .await
            .unwrap();
        chain.select("city", Some("IST".to_string())).await.unwrap();

        chain.reset().await.unwrap();

        let snap = chain.snapshot();
        assert!(snap.levels[0].selected_value.is_none());
        assert_eq!(snap.levels[0].status, LevelStatus::Ready);
        assert_eq!(snap.levels[1].status, LevelStatus::Idle);
        assert!(chain.is_quiescent());
        assert_quiescent_invariant(&chain);
    }

    #[tokio::test]
    async fn test_selection_is_prefix_only() {
        let chain = geo_chain();
        chain.prime().await.unwrap();
        chain
            .select("country", Some("TR".to_string()))
            .await
            .unwrap();

        let selection = chain.selection();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.get("country"), Some("TR"));
    }
}
