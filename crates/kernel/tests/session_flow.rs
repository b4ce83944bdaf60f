use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeDelta, TimeZone, Utc};
use mission_common::{CoreError, TerrainFile};
use mission_environment::EnvironmentTree;
use mission_kernel::{
    DEFAULT_SCENARIO_ID, PlannerConfig, Scenario, ScenarioCommand, Session, SessionRegistry,
    TerrainChange,
};
use mission_timeline::{FixedClock, PlaybackCommand, PlaybackMode};

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&hits), hits)
}

fn assert_well_formed(tree: &EnvironmentTree) {
    let mut stack = vec![tree.root()];
    let mut seen = 0;
    while let Some(id) = stack.pop() {
        let node = tree.node(id).unwrap();
        seen += 1;
        assert_eq!(node.is_refined(), !node.children().is_empty());
        for child in node.children() {
            assert_eq!(tree.node(*child).unwrap().parent(), Some(id));
        }
        stack.extend_from_slice(node.children());
    }
    assert_eq!(seen, tree.len());
}

#[test]
fn registry_lookup_and_active_scenario_edits() {
    let registry = SessionRegistry::new();
    registry.add_session(Arc::new(Session::new("ops"))).unwrap();
    assert!(matches!(
        registry.add_session(Arc::new(Session::new("ops"))),
        Err(CoreError::Duplicate(_))
    ));

    let session = registry.get_session("ops").unwrap();
    let scenario = session.active_scenario();
    assert_eq!(scenario.id(), DEFAULT_SCENARIO_ID);

    let (hits, h) = counter();
    scenario.on_environment_changed(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    let root = scenario.environment_root();
    let children = scenario.refine(root, 2).unwrap();
    assert_eq!(children.len(), 8);
    for child in &children {
        assert!(!scenario.is_refined(*child).unwrap());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Rejected edits leave the tree alone and stay silent.
    assert!(matches!(
        scenario.refine(root, 2),
        Err(CoreError::InvalidState(_))
    ));
    assert!(matches!(
        scenario.coarsen(children[0]),
        Err(CoreError::InvalidState(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    scenario.refine(children[3], 2).unwrap();
    scenario.with_environment(assert_well_formed);
    assert_eq!(scenario.coarsen(root).unwrap(), 16);
    scenario.with_environment(|tree| {
        assert_eq!(tree.len(), 1);
        assert!(!tree.contains(children[3]));
        assert_well_formed(tree);
    });
}

#[test]
fn session_never_empties() {
    let session = Session::new("ops");
    let a = session.create_scenario("a").unwrap();
    let b = session.create_scenario("b").unwrap();
    let (hits, h) = counter();
    session.on_active_scenario_changed(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    session.remove_scenario(&b).unwrap();
    assert_eq!(session.len(), 2);
    assert!(session.active_index() < session.len());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    session.remove_scenario(&a).unwrap();
    let last = session.active_scenario();
    session.remove_scenario(&last).unwrap();
    assert_eq!(session.len(), 1);
    assert_eq!(session.active_index(), 0);
    assert!(!Arc::ptr_eq(&session.active_scenario(), &last));
}

#[test]
fn playback_through_scenario() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let scenario = Scenario::with_config("clock", &PlannerConfig::default(), start)
        .unwrap()
        .with_clock(clock.clone());

    scenario.play();
    scenario.tick();
    scenario.tick();
    let frozen = scenario.time();
    assert_eq!(frozen, start + TimeDelta::minutes(2));

    scenario.stop();
    assert_eq!(scenario.mode(), PlaybackMode::Stopped);
    assert!(scenario.tick().is_none());
    assert_eq!(scenario.time(), frozen);

    scenario.apply(ScenarioCommand::Playback(PlaybackCommand::Track)).unwrap();
    clock.advance(TimeDelta::hours(1));
    scenario.tick();
    assert_eq!(scenario.time(), start + TimeDelta::hours(1));

    scenario.rewind();
    assert_eq!(scenario.mode(), PlaybackMode::Stopped);
    assert_eq!(scenario.time(), start);
}

#[test]
fn terrain_publishes_only_effective_changes() {
    let scenario = Arc::new(Scenario::new("terrain"));
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    scenario.on_terrain_changed(move |c| sink.lock().push(c.clone()));

    let mut tmp = tempfile::Builder::new()
        .prefix("valley")
        .suffix(".dt1")
        .tempfile()
        .unwrap();
    tmp.write_all(&[7u8; 1024]).unwrap();
    let file = TerrainFile::new(tmp.path());

    let dataset = scenario.load_terrain(file.clone()).unwrap().wait().unwrap();
    assert_eq!(dataset.bytes, 1024);
    scenario.add_terrain(&file).unwrap();

    assert_eq!(scenario.terrain_names(), vec![dataset.name.clone()]);
    assert_eq!(
        *seen.lock(),
        vec![TerrainChange::Added { name: dataset.name }]
    );
}

#[test]
fn panicking_subscriber_does_not_block_others() {
    let scenario = Scenario::new("noisy");
    let (hits, h) = counter();
    scenario.on_threshold_changed(|_| panic!("subscriber bug"));
    scenario.on_threshold_changed(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    scenario.set_threshold(0.7);
    scenario.set_threshold(0.2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(scenario.threshold(), 0.2);
}
