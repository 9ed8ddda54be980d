//! Per-trial runtime state and the view model exposed to presentation.

use std::fmt;

use reachlab_core::{Chirality, TrialPhase, Vec3};

use crate::config::ExperimentConfig;
use crate::pulse::PulseStatus;
use crate::tracker::JointSnapshot;

/// Notifications returned from a state machine tick, in the order they
/// happened. Cue sounds and colours hang off these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialEvent {
    Ready,
    Go,
    FalseStart,
    PulseFired,
    TargetEntered,
    Feedback { success: bool },
    Finished,
}

/// Cue shown on the start or target zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneCue {
    #[default]
    Idle,
    Ready,
    Go,
}

/// Mutable state of the trial in progress. Rebuilt on every configure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialRuntimeState {
    pub phase: TrialPhase,
    pub hold_timer_s: f64,
    pub ready_time_s: Option<f64>,
    pub go_time_s: Option<f64>,
    pub in_target_timer_s: f64,
    pub feedback_timer_s: f64,
    pub index_inside_last: bool,
    pub thumb_inside_last: bool,
    pub mcp_inside_target_last: bool,
    pub mcp_inside_start_last: bool,
    /// Rim point where each fingertip first entered the target.
    pub index_boundary: Option<Vec3>,
    pub thumb_boundary: Option<Vec3>,
    pub success: bool,
    /// Go to end of movement. Set once.
    pub movement_time_s: Option<f64>,
    pub false_starts: u32,
    pub finished_notified: bool,
}

impl TrialRuntimeState {
    pub fn started() -> Self {
        Self {
            phase: TrialPhase::MoveToStart,
            ..Self::default()
        }
    }
}

/// A cursor as it should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CursorView {
    pub position: Vec3,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CursorSet {
    pub index_tip: CursorView,
    pub thumb_tip: CursorView,
    pub index_mcp: CursorView,
}

/// Movement path drawn after the reach.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub index_tip: Vec<Vec3>,
    pub thumb_tip: Vec<Vec3>,
    pub index_mcp: Vec<Vec3>,
    recording: bool,
}

impl Trajectory {
    pub fn clear(&mut self) {
        self.index_tip.clear();
        self.thumb_tip.clear();
        self.index_mcp.clear();
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn start(&mut self) {
        self.recording = true;
    }

    pub fn stop(&mut self) {
        self.recording = false;
    }

    fn len(&self) -> usize {
        self.index_tip
            .len()
            .max(self.thumb_tip.len())
            .max(self.index_mcp.len())
    }

    /// Appends the joints of the shown cursors, up to `max_trail_points`.
    pub fn push(&mut self, joints: &JointSnapshot, config: &ExperimentConfig) {
        if !config.show_trajectory {
            return;
        }
        if config.max_trail_points > 0 && self.len() >= config.max_trail_points {
            return;
        }
        if config.show_index_cursor {
            self.index_tip.push(joints.index_tip);
        }
        if config.show_thumb_cursor {
            self.thumb_tip.push(joints.thumb_tip);
        }
        if config.show_mcp_cursor {
            self.index_mcp.push(joints.index_mcp);
        }
    }

    /// Ends the fingertip paths at their rim-crossing points.
    pub fn append_endpoints(
        &mut self,
        index_tip: Option<Vec3>,
        thumb_tip: Option<Vec3>,
        config: &ExperimentConfig,
    ) {
        if !config.show_trajectory {
            return;
        }
        if let Some(p) = index_tip.filter(|_| config.show_index_cursor) {
            self.index_tip.push(p);
        }
        if let Some(p) = thumb_tip.filter(|_| config.show_thumb_cursor) {
            self.thumb_tip.push(p);
        }
    }
}

/// Operator-facing numbers for the trial in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTelemetry {
    pub phase: TrialPhase,
    /// Ready to Go, growing until Go.
    pub ready_phase_s: f64,
    /// Go to end of movement, growing until fixed.
    pub movement_time_s: f64,
    pub target_hold_s: f64,
    pub feedback_timer_s: f64,
    pub success: bool,
    pub pulse: PulseStatus,
    pub hand: Chirality,
    pub mcp: Option<Vec3>,
}

impl fmt::Display for TrialTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State: {}", self.phase)?;
        writeln!(f, "ReadyTime: {:.3} s", self.ready_phase_s)?;
        writeln!(f, "MovementTime:   {:.3} s", self.movement_time_s)?;
        writeln!(f, "TargetHold: {:.3} s", self.target_hold_s)?;
        writeln!(f, "feedbackTimer: {:.3} s", self.feedback_timer_s)?;
        writeln!(f, "success: {}", self.success)?;
        writeln!(f, "{}", self.pulse)?;
        let hand = match self.hand {
            Chirality::Left => "Left",
            Chirality::Right => "Right",
        };
        match self.mcp {
            Some(p) => writeln!(f, "MCP ({hand}): ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z),
            None => writeln!(f, "MCP: (no data)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints(x: f32) -> JointSnapshot {
        JointSnapshot {
            index_tip: Vec3::new(x, 0.0, 0.0),
            thumb_tip: Vec3::new(x, 1.0, 0.0),
            index_mcp: Vec3::new(x, 2.0, 0.0),
        }
    }

    #[test]
    fn trajectory_follows_cursor_flags_and_cap() {
        let config = ExperimentConfig {
            show_index_cursor: true,
            max_trail_points: 3,
            ..ExperimentConfig::default()
        };
        let mut t = Trajectory::default();
        for i in 0..5 {
            t.push(&joints(i as f32), &config);
        }
        assert_eq!(t.index_tip.len(), 3);
        assert!(t.thumb_tip.is_empty());
        assert_eq!(t.index_mcp.len(), 3);

        t.append_endpoints(Some(Vec3::ZERO), Some(Vec3::ZERO), &config);
        assert_eq!(t.index_tip.len(), 4);
        assert!(t.thumb_tip.is_empty());
    }

    #[test]
    fn hidden_trajectory_stays_empty() {
        let config = ExperimentConfig {
            show_trajectory: false,
            ..ExperimentConfig::default()
        };
        let mut t = Trajectory::default();
        t.push(&joints(1.0), &config);
        assert_eq!(t, Trajectory::default());
    }

    #[test]
    fn telemetry_text_lists_every_line() {
        let telemetry = TrialTelemetry {
            phase: TrialPhase::MoveToTarget,
            ready_phase_s: 2.0,
            movement_time_s: 0.4321,
            target_hold_s: 0.0,
            feedback_timer_s: 0.0,
            success: false,
            pulse: PulseStatus::Fired {
                from_go_ms: Some(-100.0),
            },
            hand: Chirality::Left,
            mcp: Some(Vec3::new(0.1, 0.2, 0.3)),
        };
        let text = telemetry.to_string();
        assert_eq!(
            text,
            "State: MoveToTarget\n\
             ReadyTime: 2.000 s\n\
             MovementTime:   0.432 s\n\
             TargetHold: 0.000 s\n\
             feedbackTimer: 0.000 s\n\
             success: false\n\
             TTL: fired (-100.0 ms from Go)\n\
             MCP (Left): (0.10, 0.20, 0.30)\n"
        );
    }
}
