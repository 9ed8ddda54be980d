use reachlab_core::{
    in_cylinder, project_to_rim, Chirality, TrialConfig, TrialOutcome, TrialPhase, Vec3,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ExperimentConfig, SessionContext};
use crate::pulse::{PulseScheduler, PulseSink, PulseStatus};
use crate::recorder::{SavedTrial, TrialHeader, TrialRecorder};
use crate::tracker::{FingerTracker, JointSnapshot};
use crate::trial::{
    CursorSet, CursorView, TrialEvent, TrialRuntimeState, TrialTelemetry, Trajectory, ZoneCue,
};

pub const INSTRUCTION_READY: &str = "Ready";
pub const INSTRUCTION_REACH: &str = "Reach";
pub const INSTRUCTION_GO: &str = "Go";
pub const INSTRUCTION_RETURN: &str = "Return to starting position";

/// Drives one reach trial at a time.
///
/// `tick` runs on render cadence and owns every phase transition.
/// `record_frame` runs on device cadence and only appends samples.
pub struct TrialStateMachine {
    config: ExperimentConfig,
    trial: Option<TrialConfig>,
    state: TrialRuntimeState,
    pulse: PulseScheduler,
    recorder: Option<TrialRecorder>,
    trajectory: Trajectory,
    instruction: &'static str,
    start_cue: ZoneCue,
    target_cue: ZoneCue,
    zones_active: bool,
    cursors_visible: bool,
    hand_tracked: bool,
    freeze_cursors: bool,
    cursors: JointSnapshot,
    used_hand: Chirality,
    saved: Option<SavedTrial>,
    save_error: Option<String>,
    now_s: f64,
}

impl TrialStateMachine {
    pub fn new(context: &SessionContext) -> Self {
        let config = context.config.clone();
        let recorder = context
            .logging_enabled()
            .then(|| TrialRecorder::new(&context.participant_root));
        Self {
            pulse: PulseScheduler::new(config.pulse_lamp_on_s),
            used_hand: config.either_preferred_hand,
            config,
            trial: None,
            state: TrialRuntimeState::default(),
            recorder,
            trajectory: Trajectory::default(),
            instruction: "",
            start_cue: ZoneCue::Idle,
            target_cue: ZoneCue::Idle,
            zones_active: false,
            cursors_visible: true,
            hand_tracked: false,
            freeze_cursors: false,
            cursors: JointSnapshot::default(),
            saved: None,
            save_error: None,
            now_s: 0.0,
        }
    }

    /// Resets everything for `trial` and enters MoveToStart.
    pub fn configure(&mut self, trial: TrialConfig) {
        info!(
            trial = trial.trial_index,
            target = trial.target_id,
            hand_mode = trial.hand_mode.code(),
            pulse_offset_ms = trial.pulse_offset_ms,
            "trial configured"
        );
        self.pulse.configure(trial.pulse_offset_ms);
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.abort();
        }
        self.state = TrialRuntimeState::started();
        self.trajectory.clear();
        self.instruction = INSTRUCTION_READY;
        self.start_cue = ZoneCue::Idle;
        self.target_cue = ZoneCue::Idle;
        self.zones_active = true;
        self.cursors_visible = true;
        self.freeze_cursors = false;
        self.used_hand = trial
            .hand_mode
            .fixed_hand()
            .unwrap_or(self.config.either_preferred_hand);
        self.saved = None;
        self.save_error = None;
        self.trial = Some(trial);
    }

    /// Advances the trial by one render tick.
    pub fn tick(
        &mut self,
        now_s: f64,
        dt_s: f64,
        tracker: &FingerTracker,
        sink: &mut dyn PulseSink,
    ) -> Vec<TrialEvent> {
        let mut events = Vec::new();
        let Some(trial) = self.trial.clone() else {
            return events;
        };
        self.now_s = now_s;

        self.update_cursors(tracker, &trial);
        self.pulse.update_lamp(dt_s);

        let visible = tracker.visible();
        if !visible && self.state.phase.needs_tracking() {
            trace!(phase = %self.state.phase, "no tracked hand");
        }

        if visible && self.state.phase.guards_start_zone() && !self.in_start(tracker) {
            self.false_start(&mut events);
        }

        match self.state.phase {
            TrialPhase::Idle | TrialPhase::TrialDone => {}
            TrialPhase::MoveToStart => {
                if visible && self.in_start(tracker) {
                    self.state.phase = TrialPhase::HoldInStart;
                    self.state.hold_timer_s = 0.0;
                }
            }
            TrialPhase::HoldInStart => {
                if visible {
                    self.state.hold_timer_s += dt_s;
                    if self.state.hold_timer_s >= self.config.hold_duration_s {
                        self.enter_ready(now_s, tracker, &trial, &mut events);
                    }
                }
            }
            TrialPhase::WaitForGo => {
                let go_due = self
                    .state
                    .ready_time_s
                    .is_some_and(|ready| now_s - ready >= self.config.go_delay_s);
                if visible && go_due {
                    self.enter_go(now_s, &trial, &mut events);
                }
            }
            TrialPhase::MoveToTarget => self.update_move(now_s, dt_s, tracker, &trial, &mut events),
            TrialPhase::Feedback => {
                self.state.feedback_timer_s += dt_s;
                if self.state.feedback_timer_s >= self.config.feedback_duration_s {
                    self.leave_feedback(&trial);
                }
            }
        }

        self.poll_pulse(now_s, tracker, sink, &mut events);

        if self.state.phase == TrialPhase::TrialDone && !self.state.finished_notified {
            self.state.finished_notified = true;
            events.push(TrialEvent::Finished);
        }
        events
    }

    /// A pulse at or after Go stays pending until Go has actually happened,
    /// so a late Go moves it instead of letting it fire early.
    fn poll_pulse(
        &mut self,
        now_s: f64,
        tracker: &FingerTracker,
        sink: &mut dyn PulseSink,
        events: &mut Vec<TrialEvent>,
    ) {
        if self.state.phase == TrialPhase::WaitForGo && self.pulse.offset_ms() >= 0.0 {
            return;
        }
        if let Some(fired) = self.pulse.poll(now_s) {
            sink.emit(&fired);
            if let (Some(recorder), Some(ts)) = (self.recorder.as_mut(), tracker.last_timestamp_us()) {
                recorder.note_pulse(ts);
            }
            events.push(TrialEvent::PulseFired);
        }
    }

    /// Appends one recorder sample for the device frame the tracker just
    /// consumed.
    pub fn record_frame(&mut self, tracker: &FingerTracker) -> bool {
        let Some(ts) = tracker.last_timestamp_us() else {
            return false;
        };
        let joints = match (&self.trial, self.config.freeze_logged_fingertips) {
            (Some(trial), true) => self.frozen_joints(tracker.joints(), trial),
            _ => tracker.joints(),
        };
        let code = self.state.phase.code();
        self.recorder
            .as_mut()
            .is_some_and(|recorder| recorder.on_frame(ts, joints, code))
    }

    fn in_start(&self, tracker: &FingerTracker) -> bool {
        let Some(trial) = &self.trial else {
            return false;
        };
        in_cylinder(tracker.joints().index_mcp, trial.start, self.config.start_radius_m)
    }

    /// Live joints with each fingertip pinned to its rim-crossing point while
    /// it is inside the target during the reach.
    fn frozen_joints(&self, mut joints: JointSnapshot, trial: &TrialConfig) -> JointSnapshot {
        if self.state.phase != TrialPhase::MoveToTarget {
            return joints;
        }
        let inside = |p: Vec3| in_cylinder(p, trial.target, trial.target_radius_m);
        if let Some(b) = self.state.index_boundary.filter(|_| inside(joints.index_tip)) {
            joints.index_tip = b;
        }
        if let Some(b) = self.state.thumb_boundary.filter(|_| inside(joints.thumb_tip)) {
            joints.thumb_tip = b;
        }
        joints
    }

    fn update_cursors(&mut self, tracker: &FingerTracker, trial: &TrialConfig) {
        self.hand_tracked = tracker.visible();
        if !self.freeze_cursors {
            self.cursors = self.frozen_joints(tracker.joints(), trial);
        }
    }

    fn enter_ready(
        &mut self,
        now_s: f64,
        tracker: &FingerTracker,
        trial: &TrialConfig,
        events: &mut Vec<TrialEvent>,
    ) {
        self.start_cue = ZoneCue::Ready;
        self.instruction = INSTRUCTION_REACH;
        self.state.ready_time_s = Some(now_s);
        self.used_hand = tracker.selector().used_hand();

        if let Some(recorder) = self.recorder.as_mut() {
            let header = TrialHeader {
                trial_index: trial.trial_index,
                target_id: trial.target_id,
                hand_mode: trial.hand_mode,
                used_hand: self.used_hand,
                target: trial.target,
                target_radius_m: trial.target_radius_m,
                start: trial.start,
                start_radius_m: self.config.start_radius_m,
                hold_s: self.config.hold_duration_s,
                go_delay_s: self.config.go_delay_s,
                move_timeout_s: self.config.move_timeout_s,
                feedback_s: self.config.feedback_duration_s,
                pulse_offset_ms: trial.pulse_offset_ms,
                ready_time_s: now_s,
                go_time_s: None,
            };
            recorder.begin(header, tracker.last_timestamp_us().unwrap_or_default());
        }

        self.pulse.arm(now_s + self.config.go_delay_s);
        self.state.phase = TrialPhase::WaitForGo;
        debug!(trial = trial.trial_index, ready_s = now_s, hand = self.used_hand.as_str(), "ready");
        events.push(TrialEvent::Ready);
    }

    fn false_start(&mut self, events: &mut Vec<TrialEvent>) {
        self.state.hold_timer_s = 0.0;
        self.state.ready_time_s = None;
        self.state.false_starts += 1;
        self.start_cue = ZoneCue::Idle;
        self.target_cue = ZoneCue::Idle;
        self.pulse.cancel();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.abort();
        }
        self.instruction = INSTRUCTION_RETURN;
        self.state.phase = TrialPhase::MoveToStart;
        info!(false_starts = self.state.false_starts, "false start");
        events.push(TrialEvent::FalseStart);
    }

    fn enter_go(&mut self, now_s: f64, trial: &TrialConfig, events: &mut Vec<TrialEvent>) {
        self.state.go_time_s = Some(now_s);
        self.target_cue = ZoneCue::Go;
        self.instruction = INSTRUCTION_GO;
        if !trial.visual_feedback {
            self.cursors_visible = false;
        }
        if !self.pulse.retarget(now_s) && self.pulse.is_fired() {
            debug!("pulse already fired before go, not rescheduled");
        }
        self.state.mcp_inside_start_last = true;
        self.trajectory.stop();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.set_go_time(now_s);
        }
        self.state.phase = TrialPhase::MoveToTarget;
        debug!(trial = trial.trial_index, go_s = now_s, "go");
        events.push(TrialEvent::Go);
    }

    fn update_move(
        &mut self,
        now_s: f64,
        dt_s: f64,
        tracker: &FingerTracker,
        trial: &TrialConfig,
        events: &mut Vec<TrialEvent>,
    ) {
        let joints = tracker.joints();
        if tracker.visible() {
            let mcp_in_start = self.in_start(tracker);
            if !self.trajectory.is_recording() && self.state.mcp_inside_start_last && !mcp_in_start {
                self.trajectory.start();
                self.trajectory.push(&joints, &self.config);
            }
            self.state.mcp_inside_start_last = mcp_in_start;

            let inside = |p: Vec3| in_cylinder(p, trial.target, trial.target_radius_m);
            let index_in = inside(joints.index_tip);
            let thumb_in = inside(joints.thumb_tip);
            let mcp_in = inside(joints.index_mcp);

            if index_in && !self.state.index_inside_last && self.state.index_boundary.is_none() {
                self.state.index_boundary =
                    Some(project_to_rim(joints.index_tip, trial.target, trial.target_radius_m));
            }
            if thumb_in && !self.state.thumb_inside_last && self.state.thumb_boundary.is_none() {
                self.state.thumb_boundary =
                    Some(project_to_rim(joints.thumb_tip, trial.target, trial.target_radius_m));
            }

            if mcp_in {
                if !self.state.mcp_inside_target_last {
                    events.push(TrialEvent::TargetEntered);
                }
                self.state.in_target_timer_s += dt_s;
                if self.state.in_target_timer_s >= self.config.target_hold_duration_s {
                    if self.trajectory.is_recording() {
                        self.trajectory.push(&joints, &self.config);
                    }
                    self.enter_feedback(true, now_s, joints, trial, events);
                    return;
                }
            } else {
                self.state.in_target_timer_s = 0.0;
            }
            self.state.mcp_inside_target_last = mcp_in;
            self.state.index_inside_last = index_in;
            self.state.thumb_inside_last = thumb_in;

            if self.trajectory.is_recording() {
                self.trajectory.push(&joints, &self.config);
            }
        }

        let since_go = self.state.go_time_s.map_or(0.0, |go| now_s - go);
        if since_go >= self.config.move_timeout_s {
            self.enter_feedback(false, now_s, joints, trial, events);
        }
    }

    fn enter_feedback(
        &mut self,
        success: bool,
        now_s: f64,
        live: JointSnapshot,
        trial: &TrialConfig,
        events: &mut Vec<TrialEvent>,
    ) {
        if self.state.movement_time_s.is_none() {
            self.state.movement_time_s = self.state.go_time_s.map(|go| now_s - go);
        }
        self.state.success = success;
        self.trajectory.stop();
        self.instruction = "";

        if success {
            self.trajectory.append_endpoints(
                self.state.index_boundary,
                self.state.thumb_boundary,
                &self.config,
            );
            self.cursors.index_tip = self.state.index_boundary.unwrap_or(live.index_tip);
            self.cursors.thumb_tip = self.state.thumb_boundary.unwrap_or(live.thumb_tip);
        } else {
            self.cursors.index_tip = live.index_tip;
            self.cursors.thumb_tip = live.thumb_tip;
        }
        self.cursors.index_mcp = live.index_mcp;
        self.freeze_cursors = true;
        self.cursors_visible = true;

        self.state.feedback_timer_s = 0.0;
        self.state.phase = TrialPhase::Feedback;
        info!(
            trial = trial.trial_index,
            success,
            movement_time_s = self.state.movement_time_s,
            "trial feedback"
        );
        events.push(TrialEvent::Feedback { success });
    }

    fn leave_feedback(&mut self, trial: &TrialConfig) {
        self.zones_active = false;
        self.freeze_cursors = false;
        self.cursors_visible = true;

        if let Some(recorder) = self.recorder.as_mut().filter(|r| r.is_recording()) {
            match recorder.end_and_save() {
                Ok(saved) => self.saved = Some(saved),
                Err(e) => {
                    error!(trial = trial.trial_index, error = %e, "failed to save trial data");
                    self.save_error = Some(e.to_string());
                }
            }
        } else if self.recorder.is_some() {
            warn!(trial = trial.trial_index, "trial ended without a recording");
        }
        self.state.phase = TrialPhase::TrialDone;
    }

    pub fn phase(&self) -> TrialPhase {
        self.state.phase
    }

    /// Numeric phase written to each recorded sample.
    pub fn state_code(&self) -> i32 {
        self.state.phase.code()
    }

    pub fn runtime(&self) -> &TrialRuntimeState {
        &self.state
    }

    pub fn trial(&self) -> Option<&TrialConfig> {
        self.trial.as_ref()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn pulse(&self) -> &PulseScheduler {
        &self.pulse
    }

    pub fn recorder(&self) -> Option<&TrialRecorder> {
        self.recorder.as_ref()
    }

    pub fn saved(&self) -> Option<&SavedTrial> {
        self.saved.as_ref()
    }

    pub fn instruction(&self) -> &'static str {
        self.instruction
    }

    pub fn start_cue(&self) -> ZoneCue {
        self.start_cue
    }

    pub fn target_cue(&self) -> ZoneCue {
        self.target_cue
    }

    pub fn zones_active(&self) -> bool {
        self.zones_active
    }

    pub fn lamp_on(&self) -> bool {
        self.pulse.lamp_on()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn used_hand(&self) -> Chirality {
        self.used_hand
    }

    pub fn cursors(&self) -> CursorSet {
        let view = |position, shown: bool| CursorView {
            position,
            visible: shown && self.cursors_visible && self.hand_tracked,
        };
        CursorSet {
            index_tip: view(self.cursors.index_tip, self.config.show_index_cursor),
            thumb_tip: view(self.cursors.thumb_tip, self.config.show_thumb_cursor),
            index_mcp: view(self.cursors.index_mcp, self.config.show_mcp_cursor),
        }
    }

    pub fn pulse_status(&self) -> PulseStatus {
        self.pulse.status(self.state.go_time_s)
    }

    pub fn telemetry(&self, tracker: &FingerTracker) -> TrialTelemetry {
        let now = self.now_s;
        let ready_phase_s = match (self.state.ready_time_s, self.state.go_time_s) {
            (Some(ready), Some(go)) => (go - ready).max(0.0),
            (Some(ready), None) => (now - ready).max(0.0),
            _ => 0.0,
        };
        let movement_time_s = match (self.state.go_time_s, self.state.movement_time_s) {
            (Some(_), Some(fixed)) => fixed,
            (Some(go), None) => (now - go).max(0.0),
            _ => 0.0,
        };
        TrialTelemetry {
            phase: self.state.phase,
            ready_phase_s,
            movement_time_s,
            target_hold_s: self.state.in_target_timer_s,
            feedback_timer_s: self.state.feedback_timer_s,
            success: self.state.success,
            pulse: self.pulse_status(),
            hand: self.used_hand,
            mcp: tracker
                .last_timestamp_us()
                .map(|_| tracker.joints().index_mcp),
        }
    }

    /// Summary of the trial once it is done.
    pub fn outcome(&self) -> Option<TrialOutcome> {
        let trial = self.trial.as_ref()?;
        if self.state.phase != TrialPhase::TrialDone {
            return None;
        }
        Some(TrialOutcome {
            trial_index: trial.trial_index,
            target_id: trial.target_id,
            success: self.state.success,
            used_hand: self.used_hand,
            movement_time_s: self.state.movement_time_s,
            pulse_from_go_ms: self
                .pulse
                .fired_s()
                .zip(self.state.go_time_s)
                .map(|(fired, go)| (fired - go) * 1000.0),
            false_starts: self.state.false_starts,
            samples: self.saved.as_ref().map_or(0, |s| s.samples),
            save_error: self.save_error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use reachlab_core::{HandFrame, HandMode, HandPose};

    use crate::pulse::PulseEvent;

    const DT: f64 = 1.0 / 60.0;

    #[derive(Default)]
    struct CollectSink(Vec<PulseEvent>);

    impl PulseSink for CollectSink {
        fn emit(&mut self, event: &PulseEvent) {
            self.0.push(*event);
        }
    }

    fn context(logging: bool) -> SessionContext {
        SessionContext::new(
            std::env::temp_dir(),
            ExperimentConfig {
                logging_enabled: logging,
                ..ExperimentConfig::default()
            },
        )
    }

    fn trial(pulse_offset_ms: f32) -> TrialConfig {
        TrialConfig {
            trial_index: 1,
            target_id: 1,
            start: Vec3::ZERO,
            target: Vec3::new(0.3, 0.0, 0.0),
            target_radius_m: 0.05,
            visual_feedback: true,
            hand_mode: HandMode::Right,
            pulse_offset_ms,
        }
    }

    /// Render loop driving the machine against a scripted hand.
    struct Rig {
        sm: TrialStateMachine,
        tracker: FingerTracker,
        sink: CollectSink,
        now: f64,
        ts_us: i64,
        events: Vec<(f64, TrialEvent)>,
    }

    impl Rig {
        fn new(trial: TrialConfig) -> Self {
            Self::with_context(trial, &context(false))
        }

        fn with_context(trial: TrialConfig, context: &SessionContext) -> Self {
            let mut sm = TrialStateMachine::new(context);
            sm.configure(trial);
            Self {
                sm,
                tracker: FingerTracker::new(HandMode::Right, Chirality::Right),
                sink: CollectSink::default(),
                now: 0.0,
                ts_us: 0,
                events: Vec::new(),
            }
        }

        fn step(&mut self, mcp: Option<Vec3>) {
            self.now += DT;
            self.ts_us += 16_667;
            let mut frame = HandFrame::new(self.ts_us);
            if let Some(p) = mcp {
                frame = frame.with_hand(HandPose {
                    chirality: Chirality::Right,
                    index_tip: p,
                    thumb_tip: p,
                    index_mcp: p,
                });
            }
            self.tracker.on_frame(&frame);
            self.sm.record_frame(&self.tracker);
            let now = self.now;
            let events = self.sm.tick(now, DT, &self.tracker, &mut self.sink);
            self.events.extend(events.into_iter().map(|e| (now, e)));
        }

        fn run(&mut self, seconds: f64, mcp: Option<Vec3>) {
            let steps = (seconds / DT).round() as usize;
            for _ in 0..steps {
                self.step(mcp);
            }
        }

        fn time_of(&self, event: TrialEvent) -> Option<f64> {
            self.events.iter().find(|(_, e)| *e == event).map(|(t, _)| *t)
        }
    }

    const START: Option<Vec3> = Some(Vec3::ZERO);
    const TARGET: Option<Vec3> = Some(Vec3::new(0.3, 0.0, 0.0));
    const AWAY: Option<Vec3> = Some(Vec3::new(0.15, 0.0, 0.0));

    #[test]
    fn leaving_start_during_hold_is_a_false_start() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(0.25, START);
        assert_eq!(rig.sm.phase(), TrialPhase::HoldInStart);
        assert!(rig.sm.runtime().hold_timer_s > 0.0);

        rig.step(AWAY);
        assert_eq!(rig.sm.phase(), TrialPhase::MoveToStart);
        assert_eq!(rig.sm.runtime().hold_timer_s, 0.0);
        assert!(!rig.sm.pulse().is_pending());
        assert_eq!(rig.sm.instruction(), INSTRUCTION_RETURN);
        assert_eq!(rig.sm.runtime().false_starts, 1);
    }

    #[test]
    fn leaving_start_while_waiting_cancels_the_pulse() {
        let mut rig = Rig::new(trial(100.0));
        rig.run(1.0, START);
        assert_eq!(rig.sm.phase(), TrialPhase::WaitForGo);
        assert!(rig.sm.pulse().is_pending());

        rig.step(AWAY);
        assert_eq!(rig.sm.phase(), TrialPhase::MoveToStart);
        assert!(!rig.sm.pulse().is_pending());
        assert_eq!(rig.sm.runtime().ready_time_s, None);
        assert_eq!(rig.sm.start_cue(), ZoneCue::Idle);
        assert!(rig.events.iter().any(|(_, e)| *e == TrialEvent::FalseStart));
    }

    #[test]
    fn pulse_fires_once_at_offset_from_go() {
        for offset in [-300.0_f32, 0.0, 250.0] {
            let mut rig = Rig::new(trial(offset));
            rig.run(3.0, START);
            rig.run(3.5, AWAY);

            assert_eq!(rig.sink.0.len(), 1, "offset {offset}");
            let fired = rig.sink.0[0];
            assert!(fired.fired_s >= fired.planned_s);
            let go = rig.time_of(TrialEvent::Go).unwrap();
            let from_go_ms = (fired.fired_s - go) * 1000.0;
            assert_abs_diff_eq!(from_go_ms, f64::from(offset), epsilon = DT * 1000.0 + 1e-6);
        }
    }

    #[test]
    fn holding_inside_target_succeeds_and_fixes_movement_time() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(3.0, START);
        assert_eq!(rig.sm.phase(), TrialPhase::MoveToTarget);
        rig.run(0.2, AWAY);
        rig.run(1.1, TARGET);

        assert_eq!(rig.sm.phase(), TrialPhase::Feedback);
        assert!(rig.sm.runtime().success);
        let movement = rig.sm.runtime().movement_time_s.unwrap();
        let go = rig.time_of(TrialEvent::Go).unwrap();
        let feedback = rig.time_of(TrialEvent::Feedback { success: true }).unwrap();
        assert_abs_diff_eq!(movement, feedback - go, epsilon = 1e-9);
        assert!(rig.time_of(TrialEvent::TargetEntered).is_some());

        rig.run(1.0, START);
        assert_eq!(rig.sm.phase(), TrialPhase::TrialDone);
        assert_eq!(rig.sm.runtime().movement_time_s, Some(movement));

        let outcome = rig.sm.outcome().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.movement_time_s, Some(movement));
    }

    #[test]
    fn never_reaching_the_target_times_out() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(3.0, START);
        rig.run(2.7, AWAY);
        assert_eq!(rig.sm.phase(), TrialPhase::Feedback);
        assert!(!rig.sm.runtime().success);
        assert!(rig.time_of(TrialEvent::Feedback { success: false }).is_some());
        let movement = rig.sm.runtime().movement_time_s.unwrap();
        assert!(movement >= 3.0);
    }

    #[test]
    fn finished_is_emitted_exactly_once() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(3.0, START);
        rig.run(3.1, AWAY);
        rig.run(2.0, AWAY);
        let finished = rig
            .events
            .iter()
            .filter(|(_, e)| *e == TrialEvent::Finished)
            .count();
        assert_eq!(finished, 1);
        assert!(!rig.sm.zones_active());
    }

    #[test]
    fn lost_tracking_holds_the_phase() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(0.2, START);
        assert_eq!(rig.sm.phase(), TrialPhase::HoldInStart);
        let held = rig.sm.runtime().hold_timer_s;
        rig.run(2.0, None);
        assert_eq!(rig.sm.phase(), TrialPhase::HoldInStart);
        assert_eq!(rig.sm.runtime().hold_timer_s, held);
    }

    #[test]
    fn lost_tracking_still_times_out_the_reach() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(3.0, START);
        assert_eq!(rig.sm.phase(), TrialPhase::MoveToTarget);
        rig.run(2.7, None);
        assert_eq!(rig.sm.phase(), TrialPhase::Feedback);
        assert!(!rig.sm.runtime().success);
    }

    #[test]
    fn cursors_hide_from_go_to_feedback_without_visual_feedback() {
        let mut rig = Rig::new(TrialConfig {
            visual_feedback: false,
            ..trial(0.0)
        });
        rig.run(3.0, START);
        assert_eq!(rig.sm.phase(), TrialPhase::MoveToTarget);
        assert!(!rig.sm.cursors().index_mcp.visible);
        rig.run(2.7, AWAY);
        assert_eq!(rig.sm.phase(), TrialPhase::Feedback);
        assert!(rig.sm.cursors().index_mcp.visible);
    }

    #[test]
    fn cursors_hide_while_the_hand_is_lost() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(0.2, START);
        assert!(rig.sm.cursors().index_mcp.visible);

        rig.run(0.5, None);
        let cursors = rig.sm.cursors();
        assert!(!cursors.index_mcp.visible);
        assert!(!cursors.index_tip.visible);
        assert!(!cursors.thumb_tip.visible);

        rig.step(START);
        assert!(rig.sm.cursors().index_mcp.visible);
    }

    #[test]
    fn late_go_moves_a_positive_offset_pulse() {
        let mut rig = Rig::new(trial(250.0));
        rig.run(2.45, START);
        assert_eq!(rig.sm.phase(), TrialPhase::WaitForGo);
        rig.run(1.0, None);
        assert_eq!(rig.sm.phase(), TrialPhase::WaitForGo);
        assert!(rig.sink.0.is_empty());

        rig.run(0.5, START);
        let go = rig.time_of(TrialEvent::Go).unwrap();
        assert!(go > 3.4);
        assert_eq!(rig.sink.0.len(), 1);
        let from_go_ms = (rig.sink.0[0].fired_s - go) * 1000.0;
        assert_abs_diff_eq!(from_go_ms, 250.0, epsilon = DT * 1000.0 + 1e-6);
        assert!(matches!(
            rig.sm.pulse_status(),
            PulseStatus::Fired { from_go_ms: Some(ms) } if ms >= 250.0
        ));
    }

    #[test]
    fn fingertip_is_pinned_to_the_rim_it_crossed() {
        let mut rig = Rig::new(trial(0.0));
        rig.run(3.0, START);
        rig.run(0.1, Some(Vec3::new(0.2, 0.1, 0.0)));
        rig.step(Some(Vec3::new(0.27, 0.1, 0.0)));
        let boundary = rig.sm.runtime().index_boundary.unwrap();
        assert_abs_diff_eq!(boundary.x, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(boundary.y, 0.1, epsilon = 1e-6);

        rig.step(Some(Vec3::new(0.31, 0.12, 0.01)));
        assert_eq!(rig.sm.cursors().index_tip.position, boundary);
        assert_eq!(rig.sm.runtime().index_boundary, Some(boundary));
    }

    #[test]
    fn logged_fingertips_are_pinned_until_feedback() {
        let mut rig = Rig::with_context(trial(0.0), &context(true));
        rig.run(3.0, START);
        rig.run(0.1, Some(Vec3::new(0.2, 0.1, 0.0)));
        rig.step(Some(Vec3::new(0.27, 0.1, 0.0)));
        let index_boundary = rig.sm.runtime().index_boundary.unwrap();
        let thumb_boundary = rig.sm.runtime().thumb_boundary.unwrap();

        let inside = Vec3::new(0.31, 0.12, 0.01);
        rig.step(Some(inside));
        let sample = *rig.sm.recorder().unwrap().samples().last().unwrap();
        assert_eq!(sample.state_code, TrialPhase::MoveToTarget.code());
        assert_eq!(sample.index_tip, index_boundary);
        assert_eq!(sample.thumb_tip, thumb_boundary);
        assert_eq!(sample.index_mcp, inside);

        rig.run(1.1, Some(inside));
        assert_eq!(rig.sm.phase(), TrialPhase::Feedback);
        let live = Vec3::new(0.32, 0.11, 0.0);
        rig.step(Some(live));
        let sample = *rig.sm.recorder().unwrap().samples().last().unwrap();
        assert_eq!(sample.state_code, TrialPhase::Feedback.code());
        assert_eq!(sample.index_tip, live);
        assert_eq!(sample.thumb_tip, live);
    }
}
