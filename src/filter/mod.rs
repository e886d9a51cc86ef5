//! URL-synchronized filter state.
//!
//! One screen, three representations of "what is filtered", kept
//! consistent by the controller:
//!
//! 1. the in-memory [`FilterState`] snapshot,
//! 2. the URL query string ([`codec`]) for shareable/refresh-safe links,
//! 3. the in-flight network query ([`projection`] + apply tickets).

pub mod codec;
mod controller;
pub mod projection;
mod state;

pub use controller::{
    ChainSpec, ControllerConfig, FieldEdit, FilterController, HydrationPolicy, HydrationReport,
    Notification, ScreenSpec,
};
pub use projection::{FilterQuery, QueryValue};
pub use state::{FieldKind, FilterFieldSpec, FilterState, FilterValue};
