use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;
use crate::hand::{Chirality, HandMode};

/// Immutable input for one trial, merged from a target definition and a
/// session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub trial_index: u32,
    pub target_id: u32,
    pub start: Vec3,
    pub target: Vec3,
    pub target_radius_m: f32,
    pub visual_feedback: bool,
    pub hand_mode: HandMode,
    /// Signed offset of the sync pulse relative to Go.
    pub pulse_offset_ms: f32,
}

/// Summary of a finished trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial_index: u32,
    pub target_id: u32,
    pub success: bool,
    pub used_hand: Chirality,
    /// Go to trial offset, seconds. `None` when Go was never reached.
    pub movement_time_s: Option<f64>,
    /// Pulse time minus Go time.
    pub pulse_from_go_ms: Option<f64>,
    pub false_starts: u32,
    pub samples: usize,
    /// Problem saving the trial's recording, if any.
    pub save_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_optional_fields_as_null() {
        let outcome = TrialOutcome {
            trial_index: 3,
            target_id: 1,
            success: false,
            used_hand: Chirality::Left,
            movement_time_s: None,
            pulse_from_go_ms: Some(-50.0),
            false_starts: 1,
            samples: 0,
            save_error: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["used_hand"], "left");
        assert!(json["movement_time_s"].is_null());
        assert_eq!(json["pulse_from_go_ms"], -50.0);
    }
}
