use std::sync::Arc;

use chrono::Utc;
use mission_bus::{ChangeBus, SubscriptionId, labels};
use mission_common::{CapabilityDescriptor, CoreError, CoreResult, Setup};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::scenario::Scenario;

/// Id given to the scenario a session creates for itself.
pub const DEFAULT_SCENARIO_ID: &str = "Default Scenario";

/// Payload published as `activeScenarioChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveScenarioChange {
    pub previous: String,
    pub current: String,
    pub index: usize,
}

/// Keyed list of capability descriptors, in registration order.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: RwLock<Vec<CapabilityDescriptor>>,
}

impl CapabilityRegistry {
    /// Add a descriptor, replacing any previous one with the same id.
    pub fn register(&self, descriptor: CapabilityDescriptor) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => entries.push(descriptor),
        }
    }

    pub fn get(&self, id: &str) -> Option<CapabilityDescriptor> {
        self.entries.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn list(&self) -> Vec<CapabilityDescriptor> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[derive(Debug)]
struct SessionState {
    scenarios: Vec<Arc<Scenario>>,
    active: usize,
}

impl SessionState {
    fn active(&self) -> &Arc<Scenario> {
        &self.scenarios[self.active]
    }
}

/// A named set of scenarios with one of them active.
///
/// A session is never empty: it starts with a default scenario and makes a
/// fresh one whenever the last is removed.
#[derive(Debug)]
pub struct Session {
    title: String,
    config: PlannerConfig,
    state: Mutex<SessionState>,
    active_bus: ChangeBus<ActiveScenarioChange>,
    environment_specs: CapabilityRegistry,
    planner_specs: CapabilityRegistry,
    setup: RwLock<Setup>,
}

impl Session {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_config(title, PlannerConfig::default())
    }

    pub fn with_config(title: impl Into<String>, config: PlannerConfig) -> Self {
        let title = title.into();
        let setup = config.setup;
        let first = Arc::new(default_scenario(&config));
        tracing::info!(%title, "session created");
        Self {
            title,
            config,
            state: Mutex::new(SessionState {
                scenarios: vec![first],
                active: 0,
            }),
            active_bus: ChangeBus::new("session"),
            environment_specs: CapabilityRegistry::default(),
            planner_specs: CapabilityRegistry::default(),
            setup: RwLock::new(setup),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // --- Scenarios ---

    pub fn active_bus(&self) -> &ChangeBus<ActiveScenarioChange> {
        &self.active_bus
    }

    pub fn on_active_scenario_changed(
        &self,
        f: impl Fn(&ActiveScenarioChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.active_bus
            .subscribe(labels::ACTIVE_SCENARIO_CHANGED, move |_, change| f(change))
    }

    pub fn active_scenario(&self) -> Arc<Scenario> {
        Arc::clone(self.state.lock().active())
    }

    pub fn active_index(&self) -> usize {
        self.state.lock().active
    }

    pub fn scenarios(&self) -> Vec<Arc<Scenario>> {
        self.state.lock().scenarios.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().scenarios.len()
    }

    /// Never true once constructed.
    pub fn is_empty(&self) -> bool {
        self.state.lock().scenarios.is_empty()
    }

    /// First scenario whose id is `id`.
    pub fn scenario(&self, id: &str) -> CoreResult<Arc<Scenario>> {
        self.state
            .lock()
            .scenarios
            .iter()
            .find(|s| s.id() == id)
            .cloned()
            .ok_or_else(|| self.missing_scenario(id))
    }

    /// Build a scenario from this session's config and setup, add it, and
    /// make it active.
    pub fn create_scenario(&self, id: impl Into<String>) -> CoreResult<Arc<Scenario>> {
        let scenario = Scenario::with_config(id, &self.config, Utc::now())?;
        scenario.set_threshold(self.setup().default_threshold);
        let scenario = Arc::new(scenario);
        self.add_scenario(Arc::clone(&scenario))?;
        Ok(scenario)
    }

    /// Append `scenario` and make it active.
    pub fn add_scenario(&self, scenario: Arc<Scenario>) -> CoreResult<()> {
        self.update(|state| {
            if state.scenarios.iter().any(|s| Arc::ptr_eq(s, &scenario)) {
                return Err(CoreError::Duplicate(format!(
                    "scenario {:?} is already in session {:?}",
                    scenario.id(),
                    self.title
                )));
            }
            state.scenarios.push(scenario);
            state.active = state.scenarios.len() - 1;
            Ok(())
        })
    }

    /// Remove `scenario`. If it was active, the first remaining scenario
    /// becomes active; if none remain, a default scenario is created.
    pub fn remove_scenario(&self, scenario: &Arc<Scenario>) -> CoreResult<()> {
        self.update(|state| {
            let index = state
                .scenarios
                .iter()
                .position(|s| Arc::ptr_eq(s, scenario))
                .ok_or_else(|| self.missing_scenario(&scenario.id()))?;
            state.scenarios.remove(index);
            if state.scenarios.is_empty() {
                state.scenarios.push(Arc::new(default_scenario(&self.config)));
                state.active = 0;
            } else if index == state.active {
                state.active = 0;
            } else if index < state.active {
                state.active -= 1;
            }
            Ok(())
        })
    }

    /// Remove every scenario, leaving one fresh default scenario.
    pub fn clear_scenarios(&self) {
        self.update(|state| {
            state.scenarios = vec![Arc::new(default_scenario(&self.config))];
            state.active = 0;
        });
    }

    pub fn set_active(&self, index: usize) -> CoreResult<()> {
        self.update(|state| {
            if index >= state.scenarios.len() {
                return Err(CoreError::NotFound(format!(
                    "scenario index {index} in session {:?} ({} scenarios)",
                    self.title,
                    state.scenarios.len()
                )));
            }
            state.active = index;
            Ok(())
        })
    }

    pub fn set_active_id(&self, id: &str) -> CoreResult<()> {
        self.update(|state| {
            state.active = state
                .scenarios
                .iter()
                .position(|s| s.id() == id)
                .ok_or_else(|| self.missing_scenario(id))?;
            Ok(())
        })
    }

    /// Run `f` on the scenario list and publish one active-change event if
    /// the active scenario or its index moved. Fallible callers return their
    /// `CoreResult` through `R` and fail before touching the list.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let (result, moved) = {
            let mut state = self.state.lock();
            let before = Arc::clone(state.active());
            let before_index = state.active;
            let result = f(&mut *state);
            let after = state.active();
            let moved = (!Arc::ptr_eq(&before, after) || before_index != state.active)
                .then(|| (before, Arc::clone(after), state.active));
            (result, moved)
        };
        if let Some((before, after, index)) = moved {
            let change = ActiveScenarioChange {
                previous: before.id(),
                current: after.id(),
                index,
            };
            tracing::debug!(
                session = %self.title,
                previous = %change.previous,
                current = %change.current,
                index,
                "active scenario changed"
            );
            self.active_bus.publish(labels::ACTIVE_SCENARIO_CHANGED, &change);
        }
        result
    }

    fn missing_scenario(&self, id: &str) -> CoreError {
        CoreError::NotFound(format!("scenario {id:?} in session {:?}", self.title))
    }

    // --- Capabilities and setup ---

    pub fn register_environment_spec(&self, descriptor: CapabilityDescriptor) {
        tracing::debug!(session = %self.title, id = %descriptor.id, "environment spec registered");
        self.environment_specs.register(descriptor);
    }

    pub fn register_planner_spec(&self, descriptor: CapabilityDescriptor) {
        tracing::debug!(session = %self.title, id = %descriptor.id, "planner spec registered");
        self.planner_specs.register(descriptor);
    }

    pub fn environment_specs(&self) -> &CapabilityRegistry {
        &self.environment_specs
    }

    pub fn planner_specs(&self) -> &CapabilityRegistry {
        &self.planner_specs
    }

    pub fn setup(&self) -> Setup {
        *self.setup.read()
    }

    pub fn set_setup(&self, setup: Setup) {
        *self.setup.write() = setup;
    }
}

fn default_scenario(config: &PlannerConfig) -> Scenario {
    Scenario::with_config(DEFAULT_SCENARIO_ID, config, Utc::now())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config timeline rejected, using defaults");
            Scenario::new(DEFAULT_SCENARIO_ID)
        })
}
