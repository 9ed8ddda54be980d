use serde::{Deserialize, Serialize};

/// Phases a single reach trial moves through.
///
/// The discriminant is the numeric `state_code` written to every recorded
/// sample, so the order here is part of the output format.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TrialPhase {
    #[default]
    Idle = 0,
    MoveToStart = 1,
    HoldInStart = 2,
    WaitForGo = 3,
    MoveToTarget = 4,
    Feedback = 5,
    TrialDone = 6,
}

impl TrialPhase {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Phases in which leaving the start zone counts as a false start.
    pub fn guards_start_zone(&self) -> bool {
        matches!(self, Self::HoldInStart | Self::WaitForGo)
    }

    /// Phases that depend on live hand data to make progress.
    pub fn needs_tracking(&self) -> bool {
        matches!(
            self,
            Self::MoveToStart | Self::HoldInStart | Self::WaitForGo | Self::MoveToTarget
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::MoveToStart => "MoveToStart",
            Self::HoldInStart => "HoldInStart",
            Self::WaitForGo => "WaitForGo",
            Self::MoveToTarget => "MoveToTarget",
            Self::Feedback => "Feedback",
            Self::TrialDone => "TrialDone",
        }
    }
}

impl std::fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_trial_order() {
        let phases = [
            TrialPhase::Idle,
            TrialPhase::MoveToStart,
            TrialPhase::HoldInStart,
            TrialPhase::WaitForGo,
            TrialPhase::MoveToTarget,
            TrialPhase::Feedback,
            TrialPhase::TrialDone,
        ];
        let codes: Vec<i32> = phases.iter().map(TrialPhase::code).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(TrialPhase::default(), TrialPhase::Idle);
    }

    #[test]
    fn only_hold_and_wait_guard_the_start_zone() {
        assert!(TrialPhase::HoldInStart.guards_start_zone());
        assert!(TrialPhase::WaitForGo.guards_start_zone());
        assert!(!TrialPhase::MoveToStart.guards_start_zone());
        assert!(!TrialPhase::MoveToTarget.guards_start_zone());
    }
}
