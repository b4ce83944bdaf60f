//! Timeline: the scenario clock and its playback state machine.
//!
//! # Invariants
//! - Exactly one playback mode is active; modes change only through
//!   [`TimeController::apply`].
//! - Rewinding is transient: it jumps to the reset time and settles in
//!   `Stopped` within the same call.
//! - The controller never advances on its own; the owner drives it with
//!   external ticks.

mod clock;
mod controller;

pub use clock::{Clock, FixedClock, SystemClock};
pub use controller::{
    PlaybackCommand, PlaybackMode, TimeChange, TimeChangeCause, TimeController, TimelineConfig,
};
