//! Kernel: authoritative planning state.
//!
//! A [`SessionRegistry`] maps titles to [`Session`]s; each session holds an
//! ordered list of [`Scenario`]s with one active. Scenarios own their
//! environment tree, terrain set, timeline and waypoint plan, and announce
//! every effective mutation on a typed [`ChangeBus`](mission_bus::ChangeBus).
//!
//! # Invariants
//! - A session always holds at least one scenario and a valid active index.
//! - Events are published after internal locks are released.
//! - The registry is a value owned by the host, never a global.

pub mod command;
pub mod config;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod terrain;

pub use command::ScenarioCommand;
pub use config::PlannerConfig;
pub use registry::SessionRegistry;
pub use scenario::{
    ID_PROPERTY, PLAN_PROPERTY, PropertyChange, Scenario, TerrainChange, ThresholdChange,
};
pub use session::{ActiveScenarioChange, CapabilityRegistry, DEFAULT_SCENARIO_ID, Session};
pub use terrain::{TerrainDataset, TerrainTicket};
