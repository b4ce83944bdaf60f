use std::fmt;

use chrono::{DateTime, Utc};
use mission_common::Extent;
use mission_environment::{EnvironmentTree, NodeId};
use mission_kernel::{Scenario, Session};
use mission_timeline::PlaybackMode;

/// Scenario inspector for developer tooling.
///
/// Provides read-only snapshots of a scenario for logs, the CLI and
/// debugging UIs.
pub struct ScenarioInspector;

impl ScenarioInspector {
    /// Produce a summary of the scenario's current state.
    pub fn summary(scenario: &Scenario) -> ScenarioSummary {
        let (nodes, leaves, max_depth) = scenario.with_environment(|tree| {
            (tree.len(), tree.leaves().len(), tree.max_depth())
        });
        ScenarioSummary {
            id: scenario.id(),
            mode: scenario.mode(),
            time: scenario.time(),
            threshold: scenario.threshold(),
            nodes,
            leaves,
            max_depth,
            terrain: scenario.terrain_names(),
            waypoints: scenario.plan().len(),
        }
    }

    /// Depth-first outline of the environment, down to `max_depth` levels
    /// below the root.
    pub fn outline(scenario: &Scenario, max_depth: u32) -> EnvironmentOutline {
        scenario.with_environment(|tree| outline_tree(tree, max_depth))
    }
}

/// Session inspector: one line per scenario plus registry counts.
pub struct SessionInspector;

impl SessionInspector {
    pub fn summary(session: &Session) -> SessionSummary {
        let scenarios = session.scenarios();
        tracing::trace!(session = session.title(), count = scenarios.len(), "inspect");
        SessionSummary {
            title: session.title().to_owned(),
            active_index: session.active_index(),
            scenarios: scenarios
                .iter()
                .map(|s| ScenarioInspector::summary(s))
                .collect(),
            environment_specs: session
                .environment_specs()
                .list()
                .into_iter()
                .map(|d| d.id)
                .collect(),
            planner_specs: session
                .planner_specs()
                .list()
                .into_iter()
                .map(|d| d.id)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioSummary {
    pub id: String,
    pub mode: PlaybackMode,
    pub time: DateTime<Utc>,
    pub threshold: f64,
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: u32,
    pub terrain: Vec<String>,
    pub waypoints: usize,
}

impl fmt::Display for ScenarioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scenario {:?}: mode={} time={} threshold={:.2} nodes={} leaves={} depth={} terrain=[{}] waypoints={}",
            self.id,
            self.mode,
            self.time.format("%Y-%m-%dT%H:%M:%SZ"),
            self.threshold,
            self.nodes,
            self.leaves,
            self.max_depth,
            self.terrain.join(", "),
            self.waypoints,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub title: String,
    pub active_index: usize,
    pub scenarios: Vec<ScenarioSummary>,
    pub environment_specs: Vec<String>,
    pub planner_specs: Vec<String>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Session {:?}: scenarios={} active={} environment_specs=[{}] planner_specs=[{}]",
            self.title,
            self.scenarios.len(),
            self.active_index,
            self.environment_specs.join(", "),
            self.planner_specs.join(", "),
        )?;
        for (i, s) in self.scenarios.iter().enumerate() {
            let marker = if i == self.active_index { '*' } else { ' ' };
            writeln!(f, " {marker} [{i}] {s}")?;
        }
        Ok(())
    }
}

/// One node in an [`EnvironmentOutline`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub node: NodeId,
    pub depth: u32,
    pub extent: Extent,
    pub children: usize,
}

/// Depth-first listing of environment nodes.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOutline {
    pub entries: Vec<OutlineEntry>,
    /// Nodes below the depth limit that were not listed.
    pub elided: usize,
}

impl fmt::Display for EnvironmentOutline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            let min = e.extent.min;
            let max = e.extent.max;
            write!(
                f,
                "{:indent$}#{} ({:.1}, {:.1}, {:.1})..({:.1}, {:.1}, {:.1})",
                "",
                e.node.index(),
                min.x,
                min.y,
                min.z,
                max.x,
                max.y,
                max.z,
                indent = e.depth as usize * 2,
            )?;
            if e.children > 0 {
                write!(f, " [{} children]", e.children)?;
            }
            writeln!(f)?;
        }
        if self.elided > 0 {
            writeln!(f, "... {} deeper nodes", self.elided)?;
        }
        Ok(())
    }
}

fn outline_tree(tree: &EnvironmentTree, max_depth: u32) -> EnvironmentOutline {
    let mut outline = EnvironmentOutline::default();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else { continue };
        if node.depth() > max_depth {
            outline.elided += 1;
        } else {
            outline.entries.push(OutlineEntry {
                node: id,
                depth: node.depth(),
                extent: *node.extent(),
                children: node.children().len(),
            });
        }
        stack.extend(node.children().iter().rev().copied());
    }
    outline
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use mission_common::{CapabilityDescriptor, TerrainFile, Waypoint};

    #[test]
    fn summary_fresh_scenario() {
        let s = Scenario::new("alpha");
        let summary = ScenarioInspector::summary(&s);
        assert_eq!(summary.id, "alpha");
        assert_eq!(summary.mode, PlaybackMode::Stopped);
        assert_eq!(summary.nodes, 1);
        assert_eq!(summary.leaves, 1);
        assert_eq!(summary.max_depth, 0);
        assert!(summary.terrain.is_empty());
    }

    #[test]
    fn summary_reflects_edits() {
        let s = Scenario::new("alpha");
        s.refine(s.environment_root(), 2).unwrap();
        s.add_terrain(&TerrainFile::new("ridge.dt2")).unwrap();
        s.push_waypoint(Waypoint::new(DVec3::ZERO));

        let summary = ScenarioInspector::summary(&s);
        assert_eq!(summary.nodes, 9);
        assert_eq!(summary.leaves, 8);
        assert_eq!(summary.max_depth, 1);
        assert_eq!(summary.terrain, vec!["ridge".to_string()]);
        assert_eq!(summary.waypoints, 1);

        let line = summary.to_string();
        assert!(line.contains("mode=STOPPED"));
        assert!(line.contains("terrain=[ridge]"));
    }

    #[test]
    fn outline_is_depth_first_and_limited() {
        let s = Scenario::new("alpha");
        let root = s.environment_root();
        let children = s.refine(root, 2).unwrap();
        s.refine(children[0], 2).unwrap();

        let full = ScenarioInspector::outline(&s, u32::MAX);
        assert_eq!(full.entries.len(), 17);
        assert_eq!(full.elided, 0);
        assert_eq!(full.entries[0].node, root);
        assert_eq!(full.entries[1].node, children[0]);
        assert_eq!(full.entries[2].depth, 2);

        let shallow = ScenarioInspector::outline(&s, 1);
        assert_eq!(shallow.entries.len(), 9);
        assert_eq!(shallow.elided, 8);
        assert!(shallow.to_string().contains("... 8 deeper nodes"));
    }

    #[test]
    fn session_summary_marks_active() {
        let session = Session::new("ops");
        session.create_scenario("recon").unwrap();
        session.register_planner_spec(CapabilityDescriptor::new("astar", "A*"));

        let summary = SessionInspector::summary(&session);
        assert_eq!(summary.scenarios.len(), 2);
        assert_eq!(summary.active_index, 1);
        assert_eq!(summary.planner_specs, vec!["astar".to_string()]);

        let text = summary.to_string();
        assert!(text.contains(" * [1] Scenario \"recon\""));
    }
}
