//! Cascading reference-data resolution and URL-synchronized filter state.
//!
//! Every list/detail/form screen that filters hierarchical location data
//! (country → city → county → district) or multi-field record lists needs
//! the same machinery: dependent selects whose options follow their parent,
//! a canonical filter state kept in sync with the URL, and protection
//! against out-of-order network responses. This crate is that machinery,
//! once, parameterized by a small per-screen configuration instead of
//! re-implemented per screen.
//!
//! ## Architecture
//!
//! ```text
//! ScreenSpec (fields + chains)
//!         │
//!         ▼
//! FilterController ──── HistoryPort (URL read/replace)
//!         │        ──── QueryExecutor (primary list)
//!         │
//!         ├─► FilterState        immutable snapshot of all fields
//!         ├─► UrlCodec           state ⇄ query string, pure and total
//!         ├─► FilterQuery        state → network query projection
//!         └─► CascadeChain(s) ── LookupProvider (option lists)
//!                 │
//!                 ├─► CascadeNode per level (options, status, selection)
//!                 ├─► LookupCache keyed by (level, parent)
//!                 └─► RequestSequencer (stale responses discarded)
//! ```
//!
//! ## Guarantees
//!
//! - Options shown as ready always belong to the current parent value.
//! - The last request per logical slot wins regardless of network
//!   completion order.
//! - A URL round trip reproduces the committed state exactly, up to
//!   canonical emptiness.
//! - Ancestor changes clear descendants deterministically; only the
//!   immediately-next level reloads eagerly.
//!
//! All async operations are cooperative and non-blocking; widgets render a
//! loading status instead of waiting on the network.

pub mod cache;
pub mod cascade;
pub mod error;
pub mod filter;
pub mod provider;
pub mod sequencer;

pub use cache::LookupCache;
pub use cascade::{
    CascadeChain, CascadeLevelSpec, CascadeSelection, ChainError, ChainSnapshot, HydrationHalt,
    HydrationOutcome, LevelStatus, NodeSnapshot,
};
pub use error::{FieldError, LookupError, QueryError, SelectError, SetupError};
pub use filter::{
    ChainSpec, ControllerConfig, FieldEdit, FieldKind, FilterController, FilterFieldSpec,
    FilterQuery, FilterState, FilterValue, HydrationPolicy, HydrationReport, Notification,
    QueryValue, ScreenSpec,
};
pub use provider::{HistoryPort, LookupOption, LookupProvider, Page, QueryExecutor, StaticLookupProvider};
pub use sequencer::{RequestSequencer, Ticket};
