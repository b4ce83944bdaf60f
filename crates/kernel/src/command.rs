use chrono::{DateTime, TimeDelta, Utc};
use mission_common::{CoreError, CoreResult, TerrainFile, Waypoint, WaypointId};
use mission_environment::NodeId;
use mission_timeline::PlaybackCommand;
use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// A one-shot scenario mutation expressed as data.
///
/// Presenters that queue or script edits build these instead of calling the
/// scenario methods directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScenarioCommand {
    SetId(String),
    SetThreshold(f64),
    Refine { node: NodeId, factor: u32 },
    Coarsen(NodeId),
    ResetEnvironment,
    AddTerrain(TerrainFile),
    RemoveTerrain(String),
    ClearTerrain,
    Playback(PlaybackCommand),
    Tick,
    SetTime(DateTime<Utc>),
    OffsetTime { seconds: i64 },
    SetTimeStep { seconds: i64 },
    PushWaypoint(Waypoint),
    InsertWaypoint { index: usize, waypoint: Waypoint },
    RemoveWaypoint(WaypointId),
    ClearPlan,
}

impl Scenario {
    /// Run `command` against this scenario.
    pub fn apply(&self, command: ScenarioCommand) -> CoreResult<()> {
        tracing::trace!(?command, "apply scenario command");
        match command {
            ScenarioCommand::SetId(id) => self.set_id(id),
            ScenarioCommand::SetThreshold(value) => self.set_threshold(value),
            ScenarioCommand::Refine { node, factor } => {
                self.refine(node, factor)?;
            }
            ScenarioCommand::Coarsen(node) => {
                self.coarsen(node)?;
            }
            ScenarioCommand::ResetEnvironment => {
                self.reset_environment();
            }
            ScenarioCommand::AddTerrain(file) => {
                self.add_terrain(&file)?;
            }
            ScenarioCommand::RemoveTerrain(name) => {
                self.remove_terrain(&name);
            }
            ScenarioCommand::ClearTerrain => {
                self.clear_terrain();
            }
            ScenarioCommand::Playback(cmd) => {
                self.apply_playback(cmd);
            }
            ScenarioCommand::Tick => {
                self.tick();
            }
            ScenarioCommand::SetTime(time) => {
                self.set_time(time);
            }
            ScenarioCommand::OffsetTime { seconds } => {
                self.offset_time(seconds_delta(seconds)?)?;
            }
            ScenarioCommand::SetTimeStep { seconds } => {
                self.set_time_step(seconds_delta(seconds)?)?;
            }
            ScenarioCommand::PushWaypoint(waypoint) => self.push_waypoint(waypoint),
            ScenarioCommand::InsertWaypoint { index, waypoint } => {
                self.insert_waypoint(index, waypoint)?;
            }
            ScenarioCommand::RemoveWaypoint(id) => {
                self.remove_waypoint(id)?;
            }
            ScenarioCommand::ClearPlan => self.clear_plan(),
        }
        Ok(())
    }
}

fn seconds_delta(seconds: i64) -> CoreResult<TimeDelta> {
    TimeDelta::try_seconds(seconds)
        .ok_or_else(|| CoreError::Validation(format!("{seconds}s is out of range")))
}
