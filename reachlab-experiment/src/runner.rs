//! Host-loop glue: device frames in, render ticks in, trials out.

use reachlab_core::{HandFrame, TrialConfig};
use reachlab_timing::Timer;
use tracing::{info, trace};

use crate::config::SessionContext;
use crate::pulse::{LogPulseSink, PulseSink};
use crate::session::{SessionSequencer, SessionSummary};
use crate::state::TrialStateMachine;
use crate::tracker::FingerTracker;
use crate::trial::TrialEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Running,
    Complete,
}

/// Owns the tracker, state machine and sequencer for one session.
///
/// The two entry points are independent: `on_device_frame` on sensor
/// cadence and `tick`/`step` on render cadence. Both must be called from the
/// same thread.
pub struct SessionRunner<S: PulseSink = LogPulseSink> {
    context: SessionContext,
    tracker: FingerTracker,
    machine: TrialStateMachine,
    sequencer: SessionSequencer,
    sink: S,
    last_tick_s: Option<f64>,
    status: RunnerStatus,
}

impl SessionRunner<LogPulseSink> {
    pub fn new(context: SessionContext, trials: Vec<TrialConfig>) -> Self {
        Self::with_sink(context, trials, LogPulseSink)
    }
}

impl<S: PulseSink> SessionRunner<S> {
    pub fn with_sink(context: SessionContext, trials: Vec<TrialConfig>, sink: S) -> Self {
        let preferred = context.config.either_preferred_hand;
        let sequencer = SessionSequencer::new(trials, context.config.start_trial_index);
        let mut runner = Self {
            tracker: FingerTracker::new(Default::default(), preferred),
            machine: TrialStateMachine::new(&context),
            sequencer,
            sink,
            last_tick_s: None,
            status: RunnerStatus::Running,
            context,
        };
        runner.start_next();
        runner
    }

    fn start_next(&mut self) {
        match self.sequencer.advance().cloned() {
            Some(trial) => {
                self.tracker
                    .configure(trial.hand_mode, self.context.config.either_preferred_hand);
                self.machine.configure(trial);
            }
            None => {
                self.status = RunnerStatus::Complete;
                info!(summary = %self.sequencer.summary(), "session complete");
            }
        }
    }

    /// Feeds one device frame. Returns whether a sample was recorded.
    pub fn on_device_frame(&mut self, frame: &HandFrame) -> bool {
        self.tracker.on_frame(frame);
        self.machine.record_frame(&self.tracker)
    }

    /// Runs one render tick at `now_s` seconds on the render clock.
    pub fn tick(&mut self, now_s: f64, dt_s: f64) -> Vec<TrialEvent> {
        self.last_tick_s = Some(now_s);
        if self.status == RunnerStatus::Complete {
            return Vec::new();
        }
        let events = self
            .machine
            .tick(now_s, dt_s, &self.tracker, &mut self.sink);
        if !events.is_empty() {
            trace!(?events, "trial events");
        }
        if events.contains(&TrialEvent::Finished) {
            if let Some(outcome) = self.machine.outcome() {
                info!(
                    trial = outcome.trial_index,
                    success = outcome.success,
                    samples = outcome.samples,
                    "trial finished"
                );
                self.sequencer.record(outcome);
            }
            self.start_next();
        }
        events
    }

    /// Ticks using `timer` as the render clock.
    pub fn step<T: Timer>(&mut self, timer: &T) -> Vec<TrialEvent> {
        let now_s = timer.now_secs();
        let dt_s = self.last_tick_s.map_or(0.0, |last| (now_s - last).max(0.0));
        self.tick(now_s, dt_s)
    }

    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunnerStatus::Complete
    }

    pub fn machine(&self) -> &TrialStateMachine {
        &self.machine
    }

    pub fn tracker(&self) -> &FingerTracker {
        &self.tracker
    }

    pub fn sequencer(&self) -> &SessionSequencer {
        &self.sequencer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn summary(&self) -> SessionSummary {
        self.sequencer.summary()
    }
}
