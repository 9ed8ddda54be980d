//! Hand selection and the latest tracked joint positions.

use reachlab_core::{Chirality, HandFrame, HandMode, HandPose, Vec3};
use tracing::debug;

/// Resolves which detected hand drives the trial.
///
/// In either-hand mode the first decision latches for the rest of the trial:
/// when the latched hand disappears tracking is suspended, never switched to
/// the other hand, until it comes back or the selector is reset.
#[derive(Debug, Clone)]
pub struct HandSelector {
    mode: HandMode,
    preferred: Chirality,
    active: Option<Chirality>,
}

impl HandSelector {
    pub fn new(mode: HandMode, preferred: Chirality) -> Self {
        Self {
            mode,
            preferred,
            active: mode.fixed_hand(),
        }
    }

    pub fn mode(&self) -> HandMode {
        self.mode
    }

    /// Hand currently latched (fixed modes are always latched).
    pub fn active(&self) -> Option<Chirality> {
        self.active
    }

    /// Hand the trial is attributed to: the latched hand, else the default.
    pub fn used_hand(&self) -> Chirality {
        self.active
            .or(self.mode.fixed_hand())
            .unwrap_or(self.preferred)
    }

    /// Clears the latch for a new trial.
    pub fn reset(&mut self, mode: HandMode, preferred: Chirality) {
        self.mode = mode;
        self.preferred = preferred;
        self.active = mode.fixed_hand();
    }

    pub fn select<'f>(&mut self, frame: &'f HandFrame) -> Option<&'f HandPose> {
        if self.active.is_none() {
            let left = frame.hand(Chirality::Left).is_some();
            let right = frame.hand(Chirality::Right).is_some();
            self.active = match (left, right) {
                (true, false) => Some(Chirality::Left),
                (false, true) => Some(Chirality::Right),
                (true, true) => Some(self.preferred),
                (false, false) => None,
            };
            if let Some(hand) = self.active {
                debug!(hand = hand.as_str(), "either-hand mode latched");
            }
        }
        frame.hand(self.active?)
    }
}

/// Positions of the three tracked joints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointSnapshot {
    pub index_tip: Vec3,
    pub thumb_tip: Vec3,
    pub index_mcp: Vec3,
}

impl From<&HandPose> for JointSnapshot {
    fn from(pose: &HandPose) -> Self {
        Self {
            index_tip: pose.index_tip,
            thumb_tip: pose.thumb_tip,
            index_mcp: pose.index_mcp,
        }
    }
}

/// Latest joint positions of the selected hand, updated on device cadence.
///
/// Positions keep their last value while the hand is not visible.
#[derive(Debug, Clone)]
pub struct FingerTracker {
    selector: HandSelector,
    joints: JointSnapshot,
    visible: bool,
    last_timestamp_us: Option<i64>,
}

impl FingerTracker {
    pub fn new(mode: HandMode, preferred: Chirality) -> Self {
        Self {
            selector: HandSelector::new(mode, preferred),
            joints: JointSnapshot::default(),
            visible: false,
            last_timestamp_us: None,
        }
    }

    pub fn configure(&mut self, mode: HandMode, preferred: Chirality) {
        self.selector.reset(mode, preferred);
        self.visible = false;
    }

    pub fn on_frame(&mut self, frame: &HandFrame) -> bool {
        self.last_timestamp_us = Some(frame.timestamp_us);
        let was_visible = self.visible;
        match self.selector.select(frame) {
            Some(pose) => {
                self.joints = JointSnapshot::from(pose);
                self.visible = true;
            }
            None => self.visible = false,
        }
        if was_visible != self.visible {
            debug!(
                visible = self.visible,
                timestamp_us = frame.timestamp_us,
                "tracked hand visibility changed"
            );
        }
        self.visible
    }

    pub fn joints(&self) -> JointSnapshot {
        self.joints
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn last_timestamp_us(&self) -> Option<i64> {
        self.last_timestamp_us
    }

    pub fn selector(&self) -> &HandSelector {
        &self.selector
    }
}
