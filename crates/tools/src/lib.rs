//! Developer tooling: read-only inspectors over sessions and scenarios.
//!
//! # Invariants
//! - Inspectors never mutate what they look at and never publish events.

pub mod inspector;

pub use inspector::{
    EnvironmentOutline, OutlineEntry, ScenarioInspector, ScenarioSummary, SessionInspector,
    SessionSummary,
};
