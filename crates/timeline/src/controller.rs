use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mission_common::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Playback mode of a scenario clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Clock frozen at an externally set value.
    Stopped,
    /// Clock follows the wall clock on every tick.
    Tracking,
    /// Clock advances by one step per tick.
    Playing,
    /// Clock jumps back to the reset time. Never observed at rest.
    Rewinding,
    /// Clock advances by `step * fast_forward_factor` per tick.
    FastForwarding,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "STOPPED",
            Self::Tracking => "TRACKING",
            Self::Playing => "PLAYING",
            Self::Rewinding => "REWINDING",
            Self::FastForwarding => "FAST_FORWARDING",
        };
        f.write_str(s)
    }
}

/// Entry command for a playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackCommand {
    Stop,
    Track,
    Play,
    Rewind,
    FastForward,
}

impl PlaybackCommand {
    fn target(self) -> PlaybackMode {
        match self {
            Self::Stop => PlaybackMode::Stopped,
            Self::Track => PlaybackMode::Tracking,
            Self::Play => PlaybackMode::Playing,
            Self::Rewind => PlaybackMode::Rewinding,
            Self::FastForward => PlaybackMode::FastForwarding,
        }
    }
}

/// What triggered a [`TimeChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeChangeCause {
    Command(PlaybackCommand),
    Tick,
    Set,
    Offset,
    Step,
}

/// Payload published as `timeChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeChange {
    pub cause: TimeChangeCause,
    pub previous_mode: PlaybackMode,
    pub mode: PlaybackMode,
    pub time: DateTime<Utc>,
}

/// Clock stepping configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Seconds added per tick while playing.
    pub step_seconds: i64,
    /// Multiplier applied to the step while fast-forwarding.
    pub fast_forward_factor: i32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            step_seconds: 60,
            fast_forward_factor: 10,
        }
    }
}

/// Playback state machine for a scenario clock.
///
/// Every mode change goes through [`apply`](Self::apply). The controller
/// itself holds no bus; each mutating call returns the [`TimeChange`] its
/// owner publishes.
#[derive(Debug, Clone)]
pub struct TimeController {
    time: DateTime<Utc>,
    reset_time: DateTime<Utc>,
    mode: PlaybackMode,
    step: TimeDelta,
    fast_forward_factor: i32,
    clock: Arc<dyn Clock>,
}

impl TimeController {
    /// A stopped controller at `start` with a one-minute step.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            time: start,
            reset_time: start,
            mode: PlaybackMode::Stopped,
            step: TimeDelta::minutes(1),
            fast_forward_factor: TimelineConfig::default().fast_forward_factor,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(start: DateTime<Utc>, config: &TimelineConfig) -> CoreResult<Self> {
        let mut controller = Self::new(start);
        let step = TimeDelta::try_seconds(config.step_seconds).ok_or_else(|| {
            CoreError::Validation(format!("step of {}s out of range", config.step_seconds))
        })?;
        controller.set_step(step)?;
        controller.set_fast_forward_factor(config.fast_forward_factor)?;
        Ok(controller)
    }

    /// Replace the wall-clock source used by tracking mode.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn reset_time(&self) -> DateTime<Utc> {
        self.reset_time
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn step(&self) -> TimeDelta {
        self.step
    }

    pub fn fast_forward_factor(&self) -> i32 {
        self.fast_forward_factor
    }

    /// Enter the mode named by `command`, leaving the previous one.
    pub fn apply(&mut self, command: PlaybackCommand) -> TimeChange {
        let previous_mode = self.mode;
        self.mode = command.target();
        match self.mode {
            PlaybackMode::Tracking => self.time = self.clock.now(),
            PlaybackMode::Rewinding => {
                self.time = self.reset_time;
                self.mode = PlaybackMode::Stopped;
            }
            PlaybackMode::Stopped | PlaybackMode::Playing | PlaybackMode::FastForwarding => {}
        }
        tracing::debug!(%previous_mode, mode = %self.mode, time = %self.time, "playback transition");
        self.change(TimeChangeCause::Command(command), previous_mode)
    }

    pub fn stop(&mut self) -> TimeChange {
        self.apply(PlaybackCommand::Stop)
    }

    pub fn track(&mut self) -> TimeChange {
        self.apply(PlaybackCommand::Track)
    }

    pub fn play(&mut self) -> TimeChange {
        self.apply(PlaybackCommand::Play)
    }

    pub fn rewind(&mut self) -> TimeChange {
        self.apply(PlaybackCommand::Rewind)
    }

    pub fn fast_forward(&mut self) -> TimeChange {
        self.apply(PlaybackCommand::FastForward)
    }

    /// Advance the clock for one external tick according to the mode.
    ///
    /// Returns `None` when the tick left the clock unchanged.
    pub fn tick(&mut self) -> Option<TimeChange> {
        let next = match self.mode {
            PlaybackMode::Stopped | PlaybackMode::Rewinding => return None,
            PlaybackMode::Tracking => self.clock.now(),
            PlaybackMode::Playing => self.time.checked_add_signed(self.step)?,
            PlaybackMode::FastForwarding => {
                let delta = self.step.checked_mul(self.fast_forward_factor)?;
                self.time.checked_add_signed(delta)?
            }
        };
        if next == self.time {
            return None;
        }
        self.time = next;
        Some(self.change(TimeChangeCause::Tick, self.mode))
    }

    /// Set the clock directly. The mode is unchanged.
    pub fn set_time(&mut self, time: DateTime<Utc>) -> TimeChange {
        self.time = time;
        self.change(TimeChangeCause::Set, self.mode)
    }

    /// Shift the clock by a signed offset. The mode is unchanged.
    pub fn offset(&mut self, delta: TimeDelta) -> CoreResult<TimeChange> {
        self.time = self
            .time
            .checked_add_signed(delta)
            .ok_or_else(|| CoreError::Validation(format!("offset {delta} leaves clock range")))?;
        Ok(self.change(TimeChangeCause::Offset, self.mode))
    }

    /// Change the per-tick step. Must be positive.
    pub fn set_step(&mut self, step: TimeDelta) -> CoreResult<TimeChange> {
        if step <= TimeDelta::zero() {
            return Err(CoreError::Validation(format!("step {step} must be positive")));
        }
        self.step = step;
        Ok(self.change(TimeChangeCause::Step, self.mode))
    }

    pub fn set_fast_forward_factor(&mut self, factor: i32) -> CoreResult<()> {
        if factor < 2 {
            return Err(CoreError::Validation(format!(
                "fast-forward factor {factor} must be at least 2"
            )));
        }
        self.fast_forward_factor = factor;
        Ok(())
    }

    /// Change the time `rewind` jumps to.
    pub fn set_reset_time(&mut self, time: DateTime<Utc>) {
        self.reset_time = time;
    }

    fn change(&self, cause: TimeChangeCause, previous_mode: PlaybackMode) -> TimeChange {
        TimeChange {
            cause,
            previous_mode,
            mode: self.mode,
            time: self.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn starts_stopped_at_start_time() {
        let tc = TimeController::new(t0());
        assert_eq!(tc.mode(), PlaybackMode::Stopped);
        assert_eq!(tc.time(), t0());
        assert_eq!(tc.reset_time(), t0());
    }

    #[test]
    fn play_ticks_forward_by_step() {
        let mut tc = TimeController::new(t0());
        tc.play();
        tc.tick();
        tc.tick();
        assert_eq!(tc.time(), t0() + TimeDelta::minutes(2));
        assert_eq!(tc.mode(), PlaybackMode::Playing);
    }

    #[test]
    fn play_then_stop_freezes_clock() {
        let mut tc = TimeController::new(t0());
        tc.play();
        tc.tick();
        tc.tick();
        tc.tick();
        let frozen = tc.time();
        let change = tc.stop();
        assert_eq!(change.previous_mode, PlaybackMode::Playing);
        assert_eq!(change.mode, PlaybackMode::Stopped);

        assert!(tc.tick().is_none());
        assert_eq!(tc.time(), frozen);
    }

    #[test]
    fn rewind_returns_to_stopped_at_reset_from_any_mode() {
        let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(5)));
        for command in [
            PlaybackCommand::Stop,
            PlaybackCommand::Track,
            PlaybackCommand::Play,
            PlaybackCommand::FastForward,
            PlaybackCommand::Rewind,
        ] {
            let mut tc = TimeController::new(t0()).with_clock(clock.clone());
            tc.apply(command);
            tc.tick();
            tc.offset(TimeDelta::minutes(17)).unwrap();

            let change = tc.rewind();
            assert_eq!(change.mode, PlaybackMode::Stopped);
            assert_eq!(change.cause, TimeChangeCause::Command(PlaybackCommand::Rewind));
            assert_eq!(tc.mode(), PlaybackMode::Stopped);
            assert_eq!(tc.time(), t0());
        }
    }

    #[test]
    fn fast_forward_uses_multiplied_step() {
        let mut tc = TimeController::with_config(
            t0(),
            &TimelineConfig {
                step_seconds: 30,
                fast_forward_factor: 4,
            },
        )
        .unwrap();
        tc.fast_forward();
        tc.tick();
        assert_eq!(tc.time(), t0() + TimeDelta::minutes(2));
    }

    #[test]
    fn tracking_follows_wall_clock() {
        let clock = Arc::new(FixedClock::new(t0() + TimeDelta::days(1)));
        let mut tc = TimeController::new(t0()).with_clock(clock.clone());

        let change = tc.track();
        assert_eq!(change.time, t0() + TimeDelta::days(1));

        // Nothing moved, nothing to report.
        assert!(tc.tick().is_none());

        clock.advance(TimeDelta::seconds(3));
        let change = tc.tick().unwrap();
        assert_eq!(change.cause, TimeChangeCause::Tick);
        assert_eq!(tc.time(), t0() + TimeDelta::days(1) + TimeDelta::seconds(3));
    }

    #[test]
    fn leaving_play_stops_advancing() {
        let clock = Arc::new(FixedClock::new(t0()));
        let mut tc = TimeController::new(t0()).with_clock(clock);
        tc.play();
        tc.tick();
        tc.track();
        // Tracking now pins the clock to the (fixed) wall clock.
        assert!(tc.tick().is_none());
        assert_eq!(tc.time(), t0());
    }

    #[test]
    fn offset_keeps_mode() {
        let mut tc = TimeController::new(t0());
        tc.play();
        let change = tc.offset(TimeDelta::minutes(-10)).unwrap();
        assert_eq!(change.mode, PlaybackMode::Playing);
        assert_eq!(change.cause, TimeChangeCause::Offset);
        assert_eq!(tc.time(), t0() - TimeDelta::minutes(10));
    }

    #[test]
    fn offset_out_of_range_leaves_clock() {
        let mut tc = TimeController::new(DateTime::<Utc>::MAX_UTC);
        assert!(matches!(
            tc.offset(TimeDelta::days(1)),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(tc.time(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn set_time_and_reset_time() {
        let mut tc = TimeController::new(t0());
        let later = t0() + TimeDelta::hours(2);
        tc.set_reset_time(later);
        tc.set_time(t0() + TimeDelta::hours(9));
        tc.rewind();
        assert_eq!(tc.time(), later);
    }

    #[test]
    fn step_must_be_positive() {
        let mut tc = TimeController::new(t0());
        assert!(tc.set_step(TimeDelta::zero()).is_err());
        assert!(tc.set_step(TimeDelta::seconds(-1)).is_err());
        assert!(tc.set_step(TimeDelta::seconds(5)).is_ok());
        assert_eq!(tc.step(), TimeDelta::seconds(5));
        assert!(tc.set_fast_forward_factor(1).is_err());
    }

    #[test]
    fn mode_display_uses_upper_snake_case() {
        assert_eq!(PlaybackMode::FastForwarding.to_string(), "FAST_FORWARDING");
        assert_eq!(PlaybackMode::Stopped.to_string(), "STOPPED");
    }
}
