//! Hand-frame sources: a simulated participant and JSONL replay.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reachlab_core::{Chirality, HandFrame, HandMode, HandPose, TrialConfig, Vec3};
use reachlab_experiment::TrialEvent;
use tracing::{debug, info, warn};

/// Supplies device frames to the drive loop.
pub trait FrameSource {
    /// Device frames due at or before `now_s` on the render clock.
    fn poll(&mut self, now_s: f64) -> Vec<HandFrame>;

    /// Lets the source react to what the trial just did.
    fn observe(&mut self, _now_s: f64, _events: &[TrialEvent], _trial: Option<&TrialConfig>) {}

    /// True once the source will never produce another frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Resting,
    Reaching { from_s: f64, duration_s: f64 },
    Straying { until_s: f64 },
}

/// Scripted participant with human-ish jitter.
///
/// Rests in the start zone, reaches for the target after a reaction time
/// once Go is cued, occasionally leaves the start zone early and occasionally
/// drops out of tracking for a frame.
pub struct SimulatedParticipant {
    rng: StdRng,
    hand: Chirality,
    device_period_s: f64,
    next_device_s: f64,
    timestamp_us: i64,
    start: Vec3,
    target: Vec3,
    motion: Motion,
    stray_at_s: Option<f64>,
    pub false_start_probability: f64,
    pub dropout_probability: f64,
    pub jitter_m: f32,
}

impl SimulatedParticipant {
    pub fn new(hand: Chirality, device_hz: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            hand,
            device_period_s: 1.0 / device_hz,
            next_device_s: 0.0,
            timestamp_us: 1_000_000,
            start: Vec3::ZERO,
            target: Vec3::ZERO,
            motion: Motion::Resting,
            stray_at_s: None,
            false_start_probability: 0.1,
            dropout_probability: 0.005,
            jitter_m: 0.002,
        }
    }

    fn hand_for(&self, trial: &TrialConfig) -> Chirality {
        match trial.hand_mode {
            HandMode::Either => self.hand,
            fixed => fixed.fixed_hand().unwrap_or(self.hand),
        }
    }

    fn jitter(&mut self) -> Vec3 {
        let j = self.jitter_m;
        if j <= 0.0 {
            return Vec3::ZERO;
        }
        Vec3::new(
            self.rng.random_range(-j..j),
            self.rng.random_range(-j..j),
            self.rng.random_range(-j..j),
        )
    }

    fn knuckle_at(&mut self, t: f64) -> Vec3 {
        let base = match self.motion {
            Motion::Resting => self.start,
            Motion::Straying { .. } => Vec3::new(self.start.x + 0.08, self.start.y, self.start.z),
            Motion::Reaching { from_s, duration_s } => {
                let f = ((t - from_s) / duration_s).clamp(0.0, 1.0);
                // Minimum-jerk profile.
                let s = f * f * f * (10.0 - 15.0 * f + 6.0 * f * f);
                self.start.lerp(self.target, s as f32)
            }
        };
        let j = self.jitter();
        Vec3::new(base.x + j.x, base.y + j.y, base.z + j.z)
    }

    fn frame_at(&mut self, t: f64) -> HandFrame {
        if let Motion::Straying { until_s } = self.motion {
            if t >= until_s {
                self.motion = Motion::Resting;
            }
        }
        if let Some(at) = self.stray_at_s.filter(|at| t >= *at) {
            self.stray_at_s = None;
            self.motion = Motion::Straying { until_s: at + 0.3 };
        }

        let frame = HandFrame::new(self.timestamp_us);
        if self.rng.random_bool(self.dropout_probability) {
            return frame;
        }
        let mcp = self.knuckle_at(t);
        frame.with_hand(HandPose {
            chirality: self.hand,
            index_tip: Vec3::new(mcp.x + 0.06, mcp.y - 0.01, mcp.z + 0.01),
            thumb_tip: Vec3::new(mcp.x + 0.03, mcp.y - 0.02, mcp.z - 0.02),
            index_mcp: mcp,
        })
    }
}

impl FrameSource for SimulatedParticipant {
    fn poll(&mut self, now_s: f64) -> Vec<HandFrame> {
        let mut frames = Vec::new();
        while self.next_device_s <= now_s {
            let t = self.next_device_s;
            frames.push(self.frame_at(t));
            self.next_device_s += self.device_period_s;
            self.timestamp_us += (self.device_period_s * 1e6).round() as i64;
        }
        frames
    }

    fn observe(&mut self, now_s: f64, events: &[TrialEvent], trial: Option<&TrialConfig>) {
        if let Some(trial) = trial {
            self.start = trial.start;
            self.target = Vec3::new(trial.target.x, trial.start.y, trial.target.z);
            self.hand = self.hand_for(trial);
        }
        for event in events {
            match event {
                TrialEvent::Ready => {
                    if self.rng.random_bool(self.false_start_probability) {
                        let at = now_s + self.rng.random_range(0.1..1.5);
                        debug!(at, "participant will leave the start zone early");
                        self.stray_at_s = Some(at);
                    }
                }
                TrialEvent::Go => {
                    self.stray_at_s = None;
                    let reaction_s = self.rng.random_range(0.15..0.35);
                    let duration_s = self.rng.random_range(0.35..0.7);
                    self.motion = Motion::Reaching {
                        from_s: now_s + reaction_s,
                        duration_s,
                    };
                }
                TrialEvent::Finished => {
                    self.motion = Motion::Resting;
                    self.stray_at_s = None;
                }
                _ => {}
            }
        }
    }
}

/// Replays recorded frames, one JSON `HandFrame` per line.
///
/// The first frame's device time is aligned with render time zero.
pub struct ReplaySource {
    frames: VecDeque<HandFrame>,
    origin_us: Option<i64>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening replay {}", path.display()))?;
        let mut frames = VecDeque::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading replay {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HandFrame>(&line) {
                Ok(frame) => frames.push_back(frame),
                Err(e) => warn!(line = n + 1, error = %e, "skipping bad replay line"),
            }
        }
        info!(path = %path.display(), frames = frames.len(), "loaded replay");
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: impl IntoIterator<Item = HandFrame>) -> Self {
        let frames: VecDeque<HandFrame> = frames.into_iter().collect();
        let origin_us = frames.front().map(|f| f.timestamp_us);
        Self { frames, origin_us }
    }
}

impl FrameSource for ReplaySource {
    fn poll(&mut self, now_s: f64) -> Vec<HandFrame> {
        let Some(origin) = self.origin_us else {
            return Vec::new();
        };
        let horizon_us = origin + (now_s * 1e6) as i64;
        let mut due = Vec::new();
        while self
            .frames
            .front()
            .is_some_and(|f| f.timestamp_us <= horizon_us)
        {
            if let Some(frame) = self.frames.pop_front() {
                due.push(frame);
            }
        }
        due
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}
