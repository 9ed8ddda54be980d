pub mod config;
pub mod error;
pub mod pulse;
pub mod recorder;
pub mod runner;
pub mod session;
pub mod state;
pub mod table;
pub mod tracker;
pub mod trial;

pub use config::{ExperimentConfig, SessionContext};
pub use error::{ConfigError, RecorderError, SessionError, TableError};
pub use pulse::{LogPulseSink, PulseEvent, PulseScheduler, PulseSink, PulseStatus};
pub use recorder::{SavedTrial, TrialRecorder};
pub use runner::{RunnerStatus, SessionRunner};
pub use session::{build_trials, BuildDiagnostic, SessionSequencer, SessionSummary};
pub use state::TrialStateMachine;
pub use tracker::{FingerTracker, HandSelector, JointSnapshot};
pub use trial::{TrialEvent, TrialTelemetry, ZoneCue};
