//! Shared value types and errors for the mission-planning state core.
//!
//! Everything in here is plain data: no locks, no buses, no I/O. The types
//! that presenters treat as opaque (waypoints, terrain file handles,
//! capability descriptors) live here so every crate agrees on them.

pub mod error;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{CapabilityDescriptor, Extent, Setup, TerrainFile, Waypoint, WaypointId};
