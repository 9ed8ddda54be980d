use std::path::{Path, PathBuf};

use reachlab_core::Chirality;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parameters shared by every trial of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub start_radius_m: f32,
    pub hold_duration_s: f64,
    pub go_delay_s: f64,
    pub move_timeout_s: f64,
    pub feedback_duration_s: f64,
    pub target_hold_duration_s: f64,
    pub pulse_lamp_on_s: f64,
    pub show_index_cursor: bool,
    pub show_thumb_cursor: bool,
    pub show_mcp_cursor: bool,
    pub show_trajectory: bool,
    pub max_trail_points: usize,
    /// Tie-break in either-hand mode when both hands appear at once.
    pub either_preferred_hand: Chirality,
    /// Log fingertips at their rim-crossing point while inside the target.
    pub freeze_logged_fingertips: bool,
    pub logging_enabled: bool,
    /// 1-based.
    pub start_trial_index: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            start_radius_m: 0.03,
            hold_duration_s: 0.5,
            go_delay_s: 2.0,
            move_timeout_s: 3.0,
            feedback_duration_s: 0.5,
            target_hold_duration_s: 1.0,
            pulse_lamp_on_s: 0.1,
            show_index_cursor: false,
            show_thumb_cursor: false,
            show_mcp_cursor: true,
            show_trajectory: true,
            max_trail_points: 500,
            either_preferred_hand: Chirality::Right,
            freeze_logged_fingertips: true,
            logging_enabled: true,
            start_trial_index: 1,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("hold_duration_s", self.hold_duration_s),
            ("go_delay_s", self.go_delay_s),
            ("move_timeout_s", self.move_timeout_s),
            ("feedback_duration_s", self.feedback_duration_s),
            ("target_hold_duration_s", self.target_hold_duration_s),
            ("pulse_lamp_on_s", self.pulse_lamp_on_s),
        ];
        for (parameter, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    parameter,
                    reason: format!("must be a non-negative number of seconds, got {value}"),
                });
            }
        }
        if !(self.start_radius_m > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "start_radius_m",
                reason: format!("must be positive, got {}", self.start_radius_m),
            });
        }
        Ok(())
    }
}

/// Per-run context handed to the sequencer, state machine and recorder.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub participant_root: PathBuf,
    pub config: ExperimentConfig,
}

impl SessionContext {
    pub fn new(participant_root: impl Into<PathBuf>, config: ExperimentConfig) -> Self {
        Self {
            participant_root: participant_root.into(),
            config,
        }
    }

    pub fn logging_enabled(&self) -> bool {
        self.config.logging_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"go_delay_s": 1.25, "either_preferred_hand": "left"}"#)
                .unwrap();
        assert_eq!(config.go_delay_s, 1.25);
        assert_eq!(config.either_preferred_hand, Chirality::Left);
        assert_eq!(config.hold_duration_s, 0.5);
        assert_eq!(config.max_trail_points, 500);
    }

    #[test]
    fn negative_durations_are_rejected() {
        let config = ExperimentConfig {
            move_timeout_s: -1.0,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidParameter { parameter, .. }) => {
                assert_eq!(parameter, "move_timeout_s")
            }
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }

    #[test]
    fn zero_start_radius_is_rejected() {
        let config = ExperimentConfig {
            start_radius_m: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
