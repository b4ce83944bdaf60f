use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use glam::DVec3;
use mission_common::{CapabilityDescriptor, TerrainFile, Waypoint};
use mission_kernel::{PlannerConfig, Scenario, Session, SessionRegistry};
use mission_timeline::{FixedClock, PlaybackCommand};
use mission_tools::{ScenarioInspector, SessionInspector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mission-cli", about = "CLI tool for mission planning sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Planner config (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session to operate on
    #[arg(short, long, global = true, default_value = "default")]
    session: String,

    /// Threshold applied to the active scenario, in [0, 1]
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, effective config and the session summary
    Info,
    /// Build a small session end to end and print what happened
    Demo,
    /// Refine the environment along its first branch and print the outline
    Refine {
        /// Levels to refine below the root
        #[arg(short, long, default_value = "2")]
        depth: u32,
        /// Splits per axis; defaults to the config's refine factor
        #[arg(short, long)]
        factor: Option<u32>,
    },
    /// Drive the scenario clock for a number of ticks
    Playback {
        /// Number of ticks to run
        #[arg(short, long, default_value = "5")]
        ticks: u32,
        /// Playback mode to enter before ticking
        #[arg(short, long, value_enum, default_value = "play")]
        mode: ModeArg,
    },
    /// Load terrain files on the active scenario's worker
    Terrain {
        /// Terrain files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Stop,
    Track,
    Play,
    Rewind,
    FastForward,
}

impl From<ModeArg> for PlaybackCommand {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Stop => Self::Stop,
            ModeArg::Track => Self::Track,
            ModeArg::Play => Self::Play,
            ModeArg::Rewind => Self::Rewind,
            ModeArg::FastForward => Self::FastForward,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => PlannerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    if let Some(t) = cli.threshold {
        if !(0.0..=1.0).contains(&t) {
            bail!("threshold must be within [0, 1], got {t}");
        }
    }

    tracing::info!(
        session = %cli.session,
        config = ?cli.config,
        "mission-cli v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    let registry = SessionRegistry::with_config(config);
    let session = registry.get_or_create(&cli.session);
    if let Some(t) = cli.threshold {
        session.active_scenario().set_threshold(t);
    }

    match cli.command {
        Commands::Info => {
            println!("mission-cli v{}", env!("CARGO_PKG_VERSION"));
            let config = session.config();
            println!(
                "config: refine_factor={} step={}s fast_forward={}x altitude={} threshold={}",
                config.refine_factor,
                config.timeline.step_seconds,
                config.timeline.fast_forward_factor,
                config.setup.default_altitude,
                config.setup.default_threshold,
            );
            println!("sessions: {}", registry.titles().join(", "));
            print!("{}", SessionInspector::summary(&session));
        }
        Commands::Demo => run_demo(&session)?,
        Commands::Refine { depth, factor } => {
            let factor = factor.unwrap_or(session.config().refine_factor);
            let scenario = session.active_scenario();
            let mut node = scenario.environment_root();
            for _ in 0..depth {
                let children = scenario.refine(node, factor)?;
                let Some(first) = children.first() else {
                    break;
                };
                node = *first;
            }
            println!("{}", ScenarioInspector::summary(&scenario));
            print!("{}", ScenarioInspector::outline(&scenario, depth));
        }
        Commands::Playback { ticks, mode } => {
            let start = Utc::now();
            let clock = Arc::new(FixedClock::new(start));
            let scenario = Arc::new(
                Scenario::with_config("playback", session.config(), start)?
                    .with_clock(clock.clone()),
            );
            session.add_scenario(Arc::clone(&scenario))?;
            scenario.on_time_changed(|change| {
                println!(
                    "  {} -> {} at {}",
                    change.previous_mode,
                    change.mode,
                    change.time.format("%H:%M:%S")
                );
            });

            scenario.apply_playback(mode.into());
            let step = scenario.time_controller().step();
            for _ in 0..ticks {
                clock.advance(step);
                scenario.tick();
            }
            scenario.stop();
            println!("{}", ScenarioInspector::summary(&scenario));
        }
        Commands::Terrain { files } => {
            let scenario = session.active_scenario();
            let tickets = files
                .into_iter()
                .map(|path| scenario.load_terrain(TerrainFile::new(path)))
                .collect::<Result<Vec<_>, _>>()?;
            for ticket in tickets {
                match ticket.wait() {
                    Ok(dataset) => println!(
                        "{}: {} bytes sha256={}",
                        dataset.name, dataset.bytes, dataset.digest
                    ),
                    Err(e) => eprintln!("terrain load failed: {e}"),
                }
            }
            println!("{}", ScenarioInspector::summary(&scenario));
        }
    }

    Ok(())
}

fn run_demo(session: &Session) -> anyhow::Result<()> {
    session.on_active_scenario_changed(|c| {
        println!("active scenario: {} -> {} (index {})", c.previous, c.current, c.index);
    });
    session.register_environment_spec(
        CapabilityDescriptor::new("octree", "Octree").with_description("uniform 3D split"),
    );
    session.register_planner_spec(CapabilityDescriptor::new("astar", "A*"));

    let scenario = session.create_scenario("recon")?;
    scenario.on_environment_changed(|c| println!("environment: {c:?}"));
    scenario.on_terrain_changed(|c| println!("terrain: {c:?}"));

    let root = scenario.environment_root();
    let children = scenario.refine(root, session.config().refine_factor)?;
    if let Some(first) = children.first() {
        scenario.refine(*first, 2)?;
        scenario.coarsen(*first)?;
    }

    scenario.add_terrain(&TerrainFile::new("ridge.dt2"))?;
    scenario.add_terrain(&TerrainFile::new("ridge.dt2"))?;

    let altitude = session.setup().default_altitude;
    scenario.push_waypoint(
        Waypoint::new(DVec3::new(0.25, 0.25, altitude)).with_designator("IP"),
    );
    scenario.push_waypoint(
        Waypoint::new(DVec3::new(0.75, 0.75, altitude)).with_designator("TGT"),
    );

    scenario.play();
    scenario.tick();
    scenario.stop();

    let default = session.scenario(mission_kernel::DEFAULT_SCENARIO_ID)?;
    session.remove_scenario(&default)?;
    if session.len() != 1 {
        bail!("expected one scenario after removal, found {}", session.len());
    }

    print!("{}", SessionInspector::summary(session));
    Ok(())
}
