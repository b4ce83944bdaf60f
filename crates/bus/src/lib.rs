//! Change notification: labeled, typed publish/subscribe.
//!
//! # Invariants
//! - Delivery is synchronous, on the publishing thread, in registration order.
//! - A failing subscriber never stops delivery to the others and never
//!   surfaces to the publisher.
//! - Subscribers may publish or subscribe from inside a callback.

mod bus;

pub use bus::{ChangeBus, SubscriptionId};

/// Stable event labels shared by the planning core and its observers.
pub mod labels {
    pub const ENVIRONMENT_CHANGED: &str = "environmentChanged";
    pub const TERRAIN_CHANGED: &str = "terrainChanged";
    pub const TIME_CHANGED: &str = "timeChanged";
    pub const THRESHOLD_CHANGED: &str = "thresholdChanged";
    pub const ACTIVE_SCENARIO_CHANGED: &str = "activeScenarioChanged";
}
