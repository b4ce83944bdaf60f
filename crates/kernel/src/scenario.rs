use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use mission_bus::{ChangeBus, SubscriptionId, labels};
use mission_common::{CoreError, CoreResult, TerrainFile, Waypoint, WaypointId};
use mission_environment::{EnvironmentChange, EnvironmentTree, NodeId};
use mission_timeline::{Clock, PlaybackCommand, PlaybackMode, TimeChange, TimeController};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::terrain::{self, TerrainDataset, TerrainTicket, TerrainWorker};

/// Property label published when the scenario id changes.
pub const ID_PROPERTY: &str = "id";
/// Property label published when the waypoint plan changes.
pub const PLAN_PROPERTY: &str = "plan";

/// Payload published as `terrainChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerrainChange {
    Added { name: String },
    Removed { name: String },
    Cleared { removed: usize },
}

/// Payload published as `thresholdChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChange {
    pub previous: f64,
    pub current: f64,
}

/// Payload published on the property bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyChange {
    Id { previous: String, current: String },
    Plan { waypoints: usize },
}

#[derive(Debug)]
struct ScenarioState {
    environment: EnvironmentTree,
    terrain: BTreeMap<String, TerrainFile>,
    time: TimeController,
    threshold: f64,
    plan: Vec<Waypoint>,
}

/// One planning problem: environment, terrain, clock, threshold and plan.
///
/// All mutation is linearized by an internal lock. Change events are
/// published after the lock is released, so subscribers may read the
/// scenario from inside their callback.
///
/// Payloads describe the mutation that produced them. When several threads
/// mutate one scenario, events can reach a subscriber in a different order
/// than the mutations were applied; subscribers that need the current value
/// should read it back from the scenario.
///
/// The id sits behind its own lock so that sessions can name scenarios
/// without touching the scenario state.
#[derive(Debug)]
pub struct Scenario {
    id: RwLock<String>,
    state: Mutex<ScenarioState>,
    environment_bus: ChangeBus<EnvironmentChange>,
    terrain_bus: ChangeBus<TerrainChange>,
    time_bus: ChangeBus<TimeChange>,
    threshold_bus: ChangeBus<ThresholdChange>,
    property_bus: ChangeBus<PropertyChange>,
    terrain_worker: TerrainWorker,
}

impl Scenario {
    /// A scenario built from the default config, clock starting now.
    pub fn new(id: impl Into<String>) -> Self {
        let config = PlannerConfig::default();
        let time = TimeController::new(Utc::now());
        Self::assemble(id.into(), &config, time)
    }

    /// Build a scenario from `config` with its clock at `start`.
    pub fn with_config(
        id: impl Into<String>,
        config: &PlannerConfig,
        start: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let time = TimeController::with_config(start, &config.timeline)?;
        Ok(Self::assemble(id.into(), config, time))
    }

    fn assemble(id: String, config: &PlannerConfig, time: TimeController) -> Self {
        tracing::debug!(%id, "scenario created");
        Self {
            terrain_worker: TerrainWorker::new(id.clone()),
            id: RwLock::new(id),
            state: Mutex::new(ScenarioState {
                environment: EnvironmentTree::new(config.extent),
                terrain: BTreeMap::new(),
                time,
                threshold: config.setup.default_threshold,
                plan: Vec::new(),
            }),
            environment_bus: ChangeBus::new("environment"),
            terrain_bus: ChangeBus::new("terrain"),
            time_bus: ChangeBus::new("time"),
            threshold_bus: ChangeBus::new("threshold"),
            property_bus: ChangeBus::new("property"),
        }
    }

    /// Use `clock` as the wall clock for tracking mode.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        {
            let mut state = self.state.lock();
            let time = state.time.clone();
            state.time = time.with_clock(clock);
        }
        self
    }

    // --- Subscriptions ---

    pub fn environment_bus(&self) -> &ChangeBus<EnvironmentChange> {
        &self.environment_bus
    }

    pub fn terrain_bus(&self) -> &ChangeBus<TerrainChange> {
        &self.terrain_bus
    }

    pub fn time_bus(&self) -> &ChangeBus<TimeChange> {
        &self.time_bus
    }

    pub fn threshold_bus(&self) -> &ChangeBus<ThresholdChange> {
        &self.threshold_bus
    }

    pub fn property_bus(&self) -> &ChangeBus<PropertyChange> {
        &self.property_bus
    }

    pub fn on_environment_changed(
        &self,
        f: impl Fn(&EnvironmentChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.environment_bus
            .subscribe(labels::ENVIRONMENT_CHANGED, move |_, change| f(change))
    }

    pub fn on_terrain_changed(
        &self,
        f: impl Fn(&TerrainChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.terrain_bus
            .subscribe(labels::TERRAIN_CHANGED, move |_, change| f(change))
    }

    pub fn on_time_changed(
        &self,
        f: impl Fn(&TimeChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.time_bus
            .subscribe(labels::TIME_CHANGED, move |_, change| f(change))
    }

    pub fn on_threshold_changed(
        &self,
        f: impl Fn(&ThresholdChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.threshold_bus
            .subscribe(labels::THRESHOLD_CHANGED, move |_, change| f(change))
    }

    // --- Scenario properties ---

    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        let id = id.into();
        let previous = std::mem::replace(&mut *self.id.write(), id.clone());
        if previous == id {
            return;
        }
        tracing::debug!(%previous, current = %id, "scenario renamed");
        self.property_bus.publish(
            ID_PROPERTY,
            &PropertyChange::Id {
                previous,
                current: id,
            },
        );
    }

    pub fn threshold(&self) -> f64 {
        self.state.lock().threshold
    }

    /// Store a new cost threshold. No range check is applied here.
    pub fn set_threshold(&self, value: f64) {
        let previous = std::mem::replace(&mut self.state.lock().threshold, value);
        tracing::debug!(previous, current = value, "threshold set");
        self.threshold_bus.publish(
            labels::THRESHOLD_CHANGED,
            &ThresholdChange {
                previous,
                current: value,
            },
        );
    }

    // --- Environment ---

    /// Run `f` against the environment tree while holding the scenario lock.
    ///
    /// `f` must not call back into this scenario. Reading the id and calling
    /// into the owning session are fine.
    pub fn with_environment<R>(&self, f: impl FnOnce(&EnvironmentTree) -> R) -> R {
        f(&self.state.lock().environment)
    }

    pub fn environment_root(&self) -> NodeId {
        self.state.lock().environment.root()
    }

    pub fn is_refined(&self, node: NodeId) -> CoreResult<bool> {
        self.state.lock().environment.is_refined(node)
    }

    pub fn refinements(&self, node: NodeId) -> CoreResult<Vec<NodeId>> {
        Ok(self.state.lock().environment.refinements(node)?.to_vec())
    }

    pub fn refine(&self, node: NodeId, factor: u32) -> CoreResult<Vec<NodeId>> {
        let _span = tracing::info_span!("refine", ?node, factor).entered();
        let children = self.state.lock().environment.refine(node, factor)?;
        self.environment_bus.publish(
            labels::ENVIRONMENT_CHANGED,
            &EnvironmentChange::Refined {
                node,
                children: children.len(),
            },
        );
        Ok(children)
    }

    pub fn coarsen(&self, node: NodeId) -> CoreResult<usize> {
        let _span = tracing::info_span!("coarsen", ?node).entered();
        let released = self.state.lock().environment.coarsen(node)?;
        self.environment_bus.publish(
            labels::ENVIRONMENT_CHANGED,
            &EnvironmentChange::Coarsened { node, released },
        );
        Ok(released)
    }

    /// Replace the whole environment with a single root leaf over the same
    /// extent.
    pub fn reset_environment(&self) -> NodeId {
        let root = {
            let mut state = self.state.lock();
            let extent = state
                .environment
                .node(state.environment.root())
                .map(|n| *n.extent())
                .unwrap_or_default();
            state.environment = EnvironmentTree::new(extent);
            state.environment.root()
        };
        self.environment_bus.publish(
            labels::ENVIRONMENT_CHANGED,
            &EnvironmentChange::Reset { root },
        );
        root
    }

    // --- Terrain ---

    /// Terrain dataset names in sorted order.
    pub fn terrain_names(&self) -> Vec<String> {
        self.state.lock().terrain.keys().cloned().collect()
    }

    pub fn has_terrain(&self, name: &str) -> bool {
        self.state.lock().terrain.contains_key(name)
    }

    /// Insert the dataset named by `file`. Re-adding a known name changes
    /// nothing and publishes nothing. Returns the derived name.
    pub fn add_terrain(&self, file: &TerrainFile) -> CoreResult<String> {
        let name = file.name()?;
        let inserted = {
            let mut state = self.state.lock();
            if state.terrain.contains_key(&name) {
                false
            } else {
                state.terrain.insert(name.clone(), file.clone());
                true
            }
        };
        if inserted {
            tracing::debug!(%name, "terrain added");
            self.terrain_bus.publish(
                labels::TERRAIN_CHANGED,
                &TerrainChange::Added { name: name.clone() },
            );
        }
        Ok(name)
    }

    /// Remove a dataset by name. Returns whether it was present.
    pub fn remove_terrain(&self, name: &str) -> bool {
        let removed = self.state.lock().terrain.remove(name).is_some();
        if removed {
            tracing::debug!(%name, "terrain removed");
            self.terrain_bus.publish(
                labels::TERRAIN_CHANGED,
                &TerrainChange::Removed { name: name.to_owned() },
            );
        }
        removed
    }

    /// Drop every dataset. Returns how many were removed.
    pub fn clear_terrain(&self) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let n = state.terrain.len();
            state.terrain.clear();
            n
        };
        if removed > 0 {
            tracing::debug!(removed, "terrain cleared");
            self.terrain_bus.publish(labels::TERRAIN_CHANGED, &TerrainChange::Cleared { removed });
        }
        removed
    }

    /// Read `file` on this scenario's terrain worker, then add it.
    ///
    /// Loads queued on the same scenario run one after another. The name is
    /// validated up front so a bad handle fails here rather than on the
    /// ticket.
    pub fn load_terrain(self: &Arc<Self>, file: TerrainFile) -> CoreResult<TerrainTicket> {
        file.name()?;
        let (tx, rx) = std::sync::mpsc::channel();
        let scenario: Weak<Self> = Arc::downgrade(self);
        self.terrain_worker.submit(Box::new(move || {
            let Some(scenario) = scenario.upgrade() else {
                tracing::warn!(path = %file.path().display(), "scenario gone, skipping terrain load");
                return;
            };
            let result = terrain::ingest(&file).and_then(|dataset: TerrainDataset| {
                scenario.add_terrain(&dataset.file)?;
                Ok(dataset)
            });
            if let Err(e) = &result {
                tracing::warn!(error = %e, "terrain load failed");
            }
            let _ = tx.send(result);
        }))?;
        Ok(TerrainTicket::new(rx))
    }

    // --- Time ---

    pub fn mode(&self) -> PlaybackMode {
        self.state.lock().time.mode()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.state.lock().time.time()
    }

    /// Copy of the controller, for read-only inspection.
    pub fn time_controller(&self) -> TimeController {
        self.state.lock().time.clone()
    }

    pub fn apply_playback(&self, command: PlaybackCommand) -> TimeChange {
        let change = self.state.lock().time.apply(command);
        self.publish_time(&change);
        change
    }

    pub fn play(&self) -> TimeChange {
        self.apply_playback(PlaybackCommand::Play)
    }

    pub fn stop(&self) -> TimeChange {
        self.apply_playback(PlaybackCommand::Stop)
    }

    pub fn track(&self) -> TimeChange {
        self.apply_playback(PlaybackCommand::Track)
    }

    pub fn rewind(&self) -> TimeChange {
        self.apply_playback(PlaybackCommand::Rewind)
    }

    pub fn fast_forward(&self) -> TimeChange {
        self.apply_playback(PlaybackCommand::FastForward)
    }

    /// Advance the clock by one external tick.
    pub fn tick(&self) -> Option<TimeChange> {
        let change = self.state.lock().time.tick()?;
        self.publish_time(&change);
        Some(change)
    }

    pub fn set_time(&self, time: DateTime<Utc>) -> TimeChange {
        let change = self.state.lock().time.set_time(time);
        self.publish_time(&change);
        change
    }

    /// Shift the clock by a signed offset without changing mode.
    pub fn offset_time(&self, delta: TimeDelta) -> CoreResult<TimeChange> {
        let change = self.state.lock().time.offset(delta)?;
        self.publish_time(&change);
        Ok(change)
    }

    pub fn set_time_step(&self, step: TimeDelta) -> CoreResult<TimeChange> {
        let change = self.state.lock().time.set_step(step)?;
        self.publish_time(&change);
        Ok(change)
    }

    pub fn set_reset_time(&self, time: DateTime<Utc>) {
        self.state.lock().time.set_reset_time(time);
    }

    fn publish_time(&self, change: &TimeChange) {
        self.time_bus.publish(labels::TIME_CHANGED, change);
    }

    // --- Plan ---

    pub fn plan(&self) -> Vec<Waypoint> {
        self.state.lock().plan.clone()
    }

    pub fn push_waypoint(&self, waypoint: Waypoint) {
        let len = {
            let mut state = self.state.lock();
            state.plan.push(waypoint);
            state.plan.len()
        };
        self.publish_plan(len);
    }

    pub fn insert_waypoint(&self, index: usize, waypoint: Waypoint) -> CoreResult<()> {
        let len = {
            let mut state = self.state.lock();
            if index > state.plan.len() {
                return Err(CoreError::Validation(format!(
                    "waypoint index {index} past end of plan ({})",
                    state.plan.len()
                )));
            }
            state.plan.insert(index, waypoint);
            state.plan.len()
        };
        self.publish_plan(len);
        Ok(())
    }

    pub fn remove_waypoint(&self, id: WaypointId) -> CoreResult<Waypoint> {
        let (removed, len) = {
            let mut state = self.state.lock();
            let pos = state
                .plan
                .iter()
                .position(|w| w.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("waypoint {:?}", id.0)))?;
            let removed = state.plan.remove(pos);
            (removed, state.plan.len())
        };
        self.publish_plan(len);
        Ok(removed)
    }

    pub fn clear_plan(&self) {
        let had_any = {
            let mut state = self.state.lock();
            let had_any = !state.plan.is_empty();
            state.plan.clear();
            had_any
        };
        if had_any {
            self.publish_plan(0);
        }
    }

    fn publish_plan(&self, waypoints: usize) {
        self.property_bus.publish(PLAN_PROPERTY, &PropertyChange::Plan { waypoints });
    }
}
