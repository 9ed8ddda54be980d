//! Trial list construction and sequencing.

use std::collections::HashMap;
use std::fmt;

use reachlab_core::{HandMode, TrialConfig, TrialOutcome, Vec3};
use tracing::{info, warn};

use crate::error::SessionError;
use crate::table::{TargetRow, TrialRow};

/// Why a session row was left out of the trial list.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildDiagnostic {
    InvalidTargetId { trial: u32, value: String },
    MissingTarget { trial: u32, target_id: u32 },
    InvalidHand { trial: u32, value: String },
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTargetId { trial, value } => {
                write!(f, "Skipping trial {trial}: targetId '{value}' invalid")
            }
            Self::MissingTarget { trial, target_id } => {
                write!(f, "Skipping trial {trial}: TargetID {target_id} not found")
            }
            Self::InvalidHand { trial, value } => {
                write!(f, "Skipping trial {trial}: hand '{value}' invalid")
            }
        }
    }
}

/// Merges session rows with the targets they reference, in session order.
///
/// Rows with an unknown target or an invalid hand are skipped and reported.
/// A later target row with the same id replaces an earlier one.
pub fn build_trials(
    targets: &[TargetRow],
    rows: &[TrialRow],
) -> Result<(Vec<TrialConfig>, Vec<BuildDiagnostic>), SessionError> {
    if targets.is_empty() {
        return Err(SessionError::NoTargets);
    }
    if rows.is_empty() {
        return Err(SessionError::NoTrials);
    }

    let by_id: HashMap<u32, &TargetRow> = targets.iter().map(|t| (t.id, t)).collect();
    let mut trials = Vec::with_capacity(rows.len());
    let mut diagnostics = Vec::new();

    for row in rows {
        let diagnostic = match resolve_row(&by_id, row) {
            Ok(trial) => {
                trials.push(trial);
                continue;
            }
            Err(d) => d,
        };
        warn!("{diagnostic}");
        diagnostics.push(diagnostic);
    }

    if trials.is_empty() {
        return Err(SessionError::NoValidTrials {
            skipped: diagnostics.len(),
        });
    }
    info!(
        trials = trials.len(),
        skipped = diagnostics.len(),
        "built trial list"
    );
    Ok((trials, diagnostics))
}

fn resolve_row(
    targets: &HashMap<u32, &TargetRow>,
    row: &TrialRow,
) -> Result<TrialConfig, BuildDiagnostic> {
    let target_id: u32 = row
        .target
        .trim()
        .parse()
        .map_err(|_| BuildDiagnostic::InvalidTargetId {
            trial: row.trial,
            value: row.target.clone(),
        })?;
    let target = targets
        .get(&target_id)
        .ok_or(BuildDiagnostic::MissingTarget {
            trial: row.trial,
            target_id,
        })?;
    let hand_mode = HandMode::parse(&row.hand).ok_or_else(|| BuildDiagnostic::InvalidHand {
        trial: row.trial,
        value: row.hand.clone(),
    })?;

    Ok(TrialConfig {
        trial_index: row.trial,
        target_id,
        start: Vec3::new(row.startx, row.starty, row.startz),
        target: Vec3::new(target.x, target.y, target.z),
        target_radius_m: target.radius_m(),
        visual_feedback: row.visual_feedback(),
        hand_mode,
        pulse_offset_ms: row.pulse_offset_ms(),
    })
}

/// Walks the trial list one trial at a time.
#[derive(Debug, Clone)]
pub struct SessionSequencer {
    trials: Vec<TrialConfig>,
    first: usize,
    current: Option<usize>,
    outcomes: Vec<TrialOutcome>,
}

impl SessionSequencer {
    /// `start_trial_index` is 1-based and clamped to the list.
    pub fn new(trials: Vec<TrialConfig>, start_trial_index: usize) -> Self {
        let first = start_trial_index.clamp(1, trials.len().max(1)) - 1;
        Self {
            trials,
            first,
            current: None,
            outcomes: Vec::new(),
        }
    }

    /// Moves to the next trial. `None` once the list is exhausted.
    pub fn advance(&mut self) -> Option<&TrialConfig> {
        let next = self.current.map_or(self.first, |i| i + 1);
        self.current = Some(next.min(self.trials.len()));
        let trial = self.trials.get(next)?;
        info!(
            position = next + 1,
            total = self.trials.len(),
            trial = trial.trial_index,
            target = trial.target_id,
            "starting trial"
        );
        Some(trial)
    }

    pub fn record(&mut self, outcome: TrialOutcome) {
        self.outcomes.push(outcome);
    }

    /// 1-based position of the current trial and the list length.
    pub fn progress(&self) -> (usize, usize) {
        let pos = self.current.map_or(0, |i| (i + 1).min(self.trials.len()));
        (pos, self.trials.len())
    }

    pub fn is_complete(&self) -> bool {
        self.current.is_some_and(|i| i >= self.trials.len())
    }

    pub fn trials(&self) -> &[TrialConfig] {
        &self.trials
    }

    pub fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_outcomes(&self.outcomes)
    }
}

/// Totals over the finished trials of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSummary {
    pub trials: usize,
    pub successes: usize,
    pub false_starts: u32,
    pub mean_movement_time_s: Option<f64>,
    pub save_errors: usize,
}

impl SessionSummary {
    pub fn from_outcomes(outcomes: &[TrialOutcome]) -> Self {
        let times: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.movement_time_s)
            .collect();
        let mean_movement_time_s =
            (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);
        Self {
            trials: outcomes.len(),
            successes: outcomes.iter().filter(|o| o.success).count(),
            false_starts: outcomes.iter().map(|o| o.false_starts).sum(),
            mean_movement_time_s,
            save_errors: outcomes.iter().filter(|o| o.save_error.is_some()).count(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} trials, {} successful ({:.1}%), {} false starts",
            self.trials,
            self.successes,
            self.success_rate() * 100.0,
            self.false_starts
        )?;
        if let Some(mt) = self.mean_movement_time_s {
            write!(f, ", mean movement time {mt:.3} s")?;
        }
        if self.save_errors > 0 {
            write!(f, ", {} trials failed to save", self.save_errors)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reachlab_core::Chirality;

    fn target(id: u32, cm: f32) -> TargetRow {
        TargetRow {
            id,
            cm,
            x: 0.2,
            y: 0.0,
            z: 0.1,
        }
    }

    fn row(trial: u32, target: &str, hand: &str) -> TrialRow {
        TrialRow {
            trial,
            target: target.into(),
            hand: hand.into(),
            startx: 0.0,
            starty: 0.0,
            startz: 0.0,
            ttl: Some(-50.0),
            vf: "0".into(),
        }
    }

    fn outcome(success: bool, movement_time_s: Option<f64>) -> TrialOutcome {
        TrialOutcome {
            trial_index: 1,
            target_id: 1,
            success,
            used_hand: Chirality::Right,
            movement_time_s,
            pulse_from_go_ms: None,
            false_starts: 1,
            samples: 10,
            save_error: None,
        }
    }

    #[test]
    fn merge_skips_bad_rows_and_keeps_order() {
        let targets = [target(1, 6.0), target(2, 4.0)];
        let rows = [
            row(1, "2", "left"),
            row(2, "9", "1"),
            row(3, "x", "1"),
            row(4, "1", "7"),
            row(5, " 1 ", ""),
        ];
        let (trials, diagnostics) = build_trials(&targets, &rows).unwrap();

        let indices: Vec<u32> = trials.iter().map(|t| t.trial_index).collect();
        assert_eq!(indices, vec![1, 5]);
        assert_eq!(trials[0].hand_mode, HandMode::Left);
        assert_relative_eq!(trials[0].target_radius_m, 0.02);
        assert_eq!(trials[0].pulse_offset_ms, -50.0);
        assert!(!trials[0].visual_feedback);
        assert_eq!(trials[1].hand_mode, HandMode::Right);

        assert_eq!(
            diagnostics,
            vec![
                BuildDiagnostic::MissingTarget { trial: 2, target_id: 9 },
                BuildDiagnostic::InvalidTargetId { trial: 3, value: "x".into() },
                BuildDiagnostic::InvalidHand { trial: 4, value: "7".into() },
            ]
        );
    }

    #[test]
    fn empty_inputs_are_session_errors() {
        assert_eq!(
            build_trials(&[], &[row(1, "1", "1")]).unwrap_err(),
            SessionError::NoTargets
        );
        assert_eq!(
            build_trials(&[target(1, 3.0)], &[]).unwrap_err(),
            SessionError::NoTrials
        );
        assert_eq!(
            build_trials(&[target(1, 3.0)], &[row(1, "2", "1")]).unwrap_err(),
            SessionError::NoValidTrials { skipped: 1 }
        );
    }

    fn configs(n: u32) -> Vec<TrialConfig> {
        let targets = [target(1, 3.0)];
        let rows: Vec<TrialRow> = (1..=n).map(|i| row(i, "1", "1")).collect();
        build_trials(&targets, &rows).unwrap().0
    }

    #[test]
    fn sequencer_walks_to_the_end() {
        let mut seq = SessionSequencer::new(configs(3), 1);
        assert_eq!(seq.progress(), (0, 3));
        let order: Vec<u32> = std::iter::from_fn(|| seq.advance().map(|t| t.trial_index)).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(seq.is_complete());
        assert!(seq.advance().is_none());
        assert_eq!(seq.progress(), (3, 3));
    }

    #[test]
    fn start_index_is_clamped() {
        let mut seq = SessionSequencer::new(configs(3), 2);
        assert_eq!(seq.advance().map(|t| t.trial_index), Some(2));
        assert_eq!(seq.progress(), (2, 3));

        let mut seq = SessionSequencer::new(configs(3), 99);
        assert_eq!(seq.advance().map(|t| t.trial_index), Some(3));

        let mut seq = SessionSequencer::new(configs(3), 0);
        assert_eq!(seq.advance().map(|t| t.trial_index), Some(1));
    }

    #[test]
    fn summary_averages_successful_movement_times() {
        let summary = SessionSummary::from_outcomes(&[
            outcome(true, Some(1.0)),
            outcome(true, Some(2.0)),
            outcome(false, Some(3.0)),
            outcome(false, None),
        ]);
        assert_eq!(summary.trials, 4);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.false_starts, 4);
        assert_relative_eq!(summary.mean_movement_time_s.unwrap(), 1.5);
        assert_relative_eq!(summary.success_rate(), 0.5);
        assert_eq!(
            summary.to_string(),
            "4 trials, 2 successful (50.0%), 4 false starts, mean movement time 1.500 s"
        );
    }
}
