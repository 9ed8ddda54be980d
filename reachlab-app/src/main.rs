//! Reach/grasp experiment runner.
//!
//! ```bash
//! # Write example tables into a participant folder
//! reachlab template --participant data/P01
//!
//! # Run the latest tables with a simulated participant, as fast as possible
//! reachlab run --participant data/P01
//!
//! # Real-time run replaying recorded device frames
//! reachlab run --participant data/P01 --realtime --replay frames.jsonl
//! ```

mod app;
mod source;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reachlab_core::{Chirality, TrialConfig};
use reachlab_experiment::table::{
    self, TargetRow, TrialRow, TARGETS_PREFIX, TRIALS_PREFIX,
};
use reachlab_experiment::{build_trials, ExperimentConfig, SessionContext, SessionRunner};
use reachlab_timing::{HighPrecisionTimer, ManualTimer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::App;
use crate::source::{FrameSource, ReplaySource, SimulatedParticipant};

#[derive(Parser, Debug)]
#[command(name = "reachlab")]
#[command(author, version, about = "Reach and reach-to-grasp experiment runner", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a session
    Run {
        /// Participant folder holding the tables and receiving trial data
        #[arg(short, long)]
        participant: PathBuf,

        /// Targets table (default: latest targets_*.csv in the participant folder)
        #[arg(long)]
        targets: Option<PathBuf>,

        /// Session table (default: latest session_*.csv in the participant folder)
        #[arg(long)]
        session: Option<PathBuf>,

        /// JSON experiment configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 1-based trial to start from (overrides the configuration)
        #[arg(long)]
        start_trial: Option<usize>,

        /// Wall-clock timing instead of simulated time
        #[arg(long)]
        realtime: bool,

        /// Render tick rate
        #[arg(long, default_value = "60")]
        tick_hz: f64,

        /// Replay device frames from a JSONL file instead of simulating
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Simulated device rate
        #[arg(long, default_value = "120")]
        device_hz: f64,

        /// Hand the simulated participant uses in either-hand trials: left or right
        #[arg(long, default_value = "right")]
        hand: String,

        /// Seed for the simulated participant
        #[arg(long)]
        seed: Option<u64>,

        /// Give up after this many seconds of session time
        #[arg(long, default_value = "3600")]
        max_seconds: u64,

        /// Write trial outcomes as JSON
        #[arg(long)]
        outcomes: Option<PathBuf>,
    },

    /// Write example targets and session tables into a participant folder
    Template {
        #[arg(short, long)]
        participant: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("reachlab v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            participant,
            targets,
            session,
            config,
            start_trial,
            realtime,
            tick_hz,
            replay,
            device_hz,
            hand,
            seed,
            max_seconds,
            outcomes,
        } => {
            let mut config = match config {
                Some(path) => ExperimentConfig::from_json_file(&path)?,
                None => ExperimentConfig::default(),
            };
            if let Some(start) = start_trial {
                config.start_trial_index = start;
            }
            let trials = load_trials(&participant, targets, session)?;
            let context = SessionContext::new(&participant, config);
            let runner = SessionRunner::new(context, trials);

            let source: Box<dyn FrameSource> = match replay {
                Some(path) => Box::new(ReplaySource::open(&path)?),
                None => Box::new(SimulatedParticipant::new(parse_hand(&hand), device_hz, seed)),
            };
            let max_session = Duration::from_secs(max_seconds);

            let (summary, finished) = if realtime {
                let mut app = App::new(runner, HighPrecisionTimer::new(), source, tick_hz, max_session);
                let summary = app.run()?;
                (summary, app.runner().sequencer().outcomes().to_vec())
            } else {
                let mut app = App::new(runner, ManualTimer::new(), source, tick_hz, max_session);
                let summary = app.run()?;
                (summary, app.runner().sequencer().outcomes().to_vec())
            };

            if let Some(path) = outcomes {
                let json = serde_json::to_string_pretty(&finished)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing outcomes to {}", path.display()))?;
                info!(path = %path.display(), "wrote trial outcomes");
            }

            println!("Session summary: {summary}");
            for o in &finished {
                println!(
                    "  trial {:>4}  target {:>3}  {:<7}  hand {:<5}  movement {}  false starts {}",
                    o.trial_index,
                    o.target_id,
                    if o.success { "success" } else { "timeout" },
                    o.used_hand.as_str(),
                    o.movement_time_s
                        .map_or_else(|| "-".to_owned(), |s| format!("{s:.3} s")),
                    o.false_starts,
                );
            }
        }
        Commands::Template { participant } => write_template(&participant)?,
    }

    Ok(())
}

fn parse_hand(text: &str) -> Chirality {
    match text.trim().to_ascii_lowercase().as_str() {
        "left" | "l" => Chirality::Left,
        "right" | "r" => Chirality::Right,
        other => {
            warn!(hand = other, "unknown hand, using right");
            Chirality::Right
        }
    }
}

fn load_trials(
    participant: &Path,
    targets: Option<PathBuf>,
    session: Option<PathBuf>,
) -> Result<Vec<TrialConfig>> {
    let targets_path = match targets {
        Some(p) => p,
        None => table::find_latest_table(participant, TARGETS_PREFIX)?,
    };
    let session_path = match session {
        Some(p) => p,
        None => table::find_latest_table(participant, TRIALS_PREFIX)?,
    };
    info!(targets = %targets_path.display(), session = %session_path.display(), "using tables");

    let target_rows = table::read_targets(&targets_path)?;
    let trial_rows = table::read_trials(&session_path)?;
    let (trials, skipped) = build_trials(&target_rows, &trial_rows)?;
    for diagnostic in &skipped {
        println!("{diagnostic}");
    }
    Ok(trials)
}

fn write_template(participant: &Path) -> Result<()> {
    let targets: Vec<TargetRow> = [(1, 6.0, -0.15), (2, 4.0, 0.0), (3, 3.0, 0.15)]
        .into_iter()
        .map(|(id, cm, x)| TargetRow {
            id,
            cm,
            x,
            y: 0.0,
            z: 0.25,
        })
        .collect();

    let hands = ["1", "0", "2"];
    let offsets = [0.0, -100.0, 150.0];
    let trials: Vec<TrialRow> = (0..9u32)
        .map(|i| TrialRow {
            trial: i + 1,
            target: (i % 3 + 1).to_string(),
            hand: hands[(i / 3) as usize].to_owned(),
            startx: 0.0,
            starty: 0.0,
            startz: 0.0,
            ttl: Some(offsets[(i % 3) as usize]),
            vf: if i % 2 == 0 { "1" } else { "0" }.to_owned(),
        })
        .collect();

    let t = table::save_targets(participant, &targets)?;
    let s = table::save_trials(participant, &trials)?;
    println!("Wrote {}", t.display());
    println!("Wrote {}", s.display());
    Ok(())
}
