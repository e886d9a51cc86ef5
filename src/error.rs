//! Error taxonomy for the filter engine.
//!
//! Three kinds of outcome deliberately do NOT live here because they are not
//! errors: a stale response being discarded (expected sequencing behavior),
//! a hydration halt on an id that no longer resolves (a legitimate partial
//! outcome, see `HydrationOutcome`), and an empty decode (the codec is
//! total and drops what it cannot read).

use thiserror::Error;

/// A reference-data fetch failed at one cascade level.
///
/// Recoverable: the level stays in `Error` status and re-selecting its
/// parent retries the fetch. Never propagates as a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("lookup failed for level '{level_id}': {message}")]
pub struct LookupError {
    /// Level whose option list could not be fetched.
    pub level_id: String,
    /// Human-readable transport/server message from the provider.
    pub message: String,
}

impl LookupError {
    pub fn new(level_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level_id: level_id.into(),
            message: message.into(),
        }
    }
}

/// A `select()` call supplied a value the level's current options do not
/// contain, or named a level the chain does not have.
///
/// This is a programming/UI-race defect, not a user error: it is asserted
/// in debug builds and degrades to a rejected call in release builds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("value '{value}' is not among the current options of level '{level_id}'")]
    NotInOptions { level_id: String, value: String },

    #[error("level '{level_id}' does not exist in this chain")]
    UnknownLevel { level_id: String },

    #[error("level '{level_id}' has no options loaded (status {status})")]
    NotReady { level_id: String, status: String },
}

/// The screen's primary-list query failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("query failed: {message}")]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while wiring a screen's configuration together, before any
/// network traffic happens. These indicate a bad screen definition and are
/// reported once at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("chain must declare at least one level")]
    EmptyChain { chain_id: String },

    #[error("first level '{level_id}' of chain '{chain_id}' must not declare a parent")]
    RootHasParent { chain_id: String, level_id: String },

    #[error(
        "level '{level_id}' of chain '{chain_id}' declares parent '{declared}', expected '{expected}'"
    )]
    BrokenLink {
        chain_id: String,
        level_id: String,
        declared: String,
        expected: String,
    },

    #[error("duplicate level '{level_id}' in chain '{chain_id}'")]
    DuplicateLevel { chain_id: String, level_id: String },

    #[error("duplicate chain id '{chain_id}'")]
    DuplicateChain { chain_id: String },

    #[error("duplicate filter field '{name}'")]
    DuplicateField { name: String },

    #[error("field '{name}' references unknown chain '{chain_id}'")]
    UnknownChain { name: String, chain_id: String },

    #[error("field '{name}' declares levels {declared:?} but chain '{chain_id}' has {actual:?}")]
    LevelMismatch {
        name: String,
        chain_id: String,
        declared: Vec<String>,
        actual: Vec<String>,
    },
}

/// Errors from controller field edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("unknown filter field '{name}'")]
    UnknownField { name: String },

    #[error("field '{name}' is a {expected} field, got a {given} edit")]
    KindMismatch {
        name: String,
        expected: &'static str,
        given: &'static str,
    },

    #[error(transparent)]
    Select(#[from] SelectError),
}
