//! Frame-synchronous trial recording.
//!
//! Samples are taken on device cadence from Ready until the trial ends and
//! written to one file per hand side:
//!
//! ```text
//! <root>/session_NNN/01/<trial>.csv   right
//! <root>/session_NNN/02/<trial>.csv   left
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use reachlab_core::{Chirality, HandMode, Vec3};
use tracing::{debug, info, trace};

use crate::error::{RecorderError, RecorderResult};
use crate::tracker::JointSnapshot;

pub const COLUMNS: [&str; 12] = [
    "t_ms_from_ready",
    "state_code",
    "ttl",
    "idx_x",
    "idx_y",
    "idx_z",
    "thb_x",
    "thb_y",
    "thb_z",
    "mcp_x",
    "mcp_y",
    "mcp_z",
];

/// One recorded device frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device time since Ready.
    pub t_us_from_ready: i64,
    pub state_code: i32,
    pub index_tip: Vec3,
    pub thumb_tip: Vec3,
    pub index_mcp: Vec3,
}

/// Trial metadata written above the data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialHeader {
    pub trial_index: u32,
    pub target_id: u32,
    pub hand_mode: HandMode,
    pub used_hand: Chirality,
    pub target: Vec3,
    pub target_radius_m: f32,
    pub start: Vec3,
    pub start_radius_m: f32,
    pub hold_s: f64,
    pub go_delay_s: f64,
    pub move_timeout_s: f64,
    pub feedback_s: f64,
    pub pulse_offset_ms: f32,
    pub ready_time_s: f64,
    pub go_time_s: Option<f64>,
}

/// Paths written by a completed recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedTrial {
    pub session_dir: PathBuf,
    pub right: PathBuf,
    pub left: PathBuf,
    pub samples: usize,
}

pub fn session_folder(index: u32) -> String {
    format!("session_{index:03}")
}

pub fn trial_filename(trial_index: u32) -> String {
    format!("{trial_index:04}.csv")
}

fn hand_dir(hand: Chirality) -> &'static str {
    match hand {
        Chirality::Right => "01",
        Chirality::Left => "02",
    }
}

/// Highest `session_NNN` index under `root`, 0 when there is none.
pub fn latest_session_index(root: &Path) -> u32 {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("session_"))
                .and_then(|n| n.parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0)
}

fn session_contains_trial(root: &Path, session: u32, file: &str) -> bool {
    let dir = root.join(session_folder(session));
    [Chirality::Right, Chirality::Left]
        .iter()
        .any(|h| dir.join(hand_dir(*h)).join(file).exists())
}

/// First session folder, starting from the latest, that holds no file for
/// this trial number in either hand subfolder.
pub fn resolve_session_dir(root: &Path, trial_index: u32) -> PathBuf {
    let file = trial_filename(trial_index);
    let mut session = latest_session_index(root).max(1);
    while session_contains_trial(root, session, &file) {
        session += 1;
    }
    root.join(session_folder(session))
}

#[derive(Debug)]
pub struct TrialRecorder {
    root: PathBuf,
    recording: bool,
    ready_ts_us: Option<i64>,
    pulse_us_from_ready: Option<i64>,
    header: Option<TrialHeader>,
    samples: Vec<Sample>,
}

impl TrialRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recording: false,
            ready_ts_us: None,
            pulse_us_from_ready: None,
            header: None,
            samples: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a fresh recording anchored at the device time of Ready.
    pub fn begin(&mut self, header: TrialHeader, ready_ts_us: i64) {
        debug!(
            trial = header.trial_index,
            ready_ts_us, "recording started"
        );
        self.header = Some(header);
        self.ready_ts_us = Some(ready_ts_us);
        self.pulse_us_from_ready = None;
        self.samples.clear();
        self.recording = true;
    }

    /// Stops without writing anything (false start before Go).
    pub fn abort(&mut self) {
        if self.recording {
            debug!(samples = self.samples.len(), "recording discarded");
        }
        self.recording = false;
        self.ready_ts_us = None;
        self.pulse_us_from_ready = None;
        self.samples.clear();
    }

    pub fn set_go_time(&mut self, go_time_s: f64) {
        if let Some(header) = self.header.as_mut() {
            header.go_time_s = Some(go_time_s);
        }
    }

    /// Remembers the device time at which the pulse fired.
    pub fn note_pulse(&mut self, device_ts_us: i64) {
        let Some(ready) = self.ready_ts_us.filter(|_| self.recording) else {
            return;
        };
        self.pulse_us_from_ready = Some((device_ts_us - ready).max(0));
    }

    /// Appends one sample for a device frame. Frames before Ready and frames
    /// not newer than the last sample are dropped.
    pub fn on_frame(&mut self, device_ts_us: i64, joints: JointSnapshot, state_code: i32) -> bool {
        let Some(ready) = self.ready_ts_us.filter(|_| self.recording) else {
            return false;
        };
        let t = device_ts_us - ready;
        if t < 0 {
            return false;
        }
        if let Some(last) = self.samples.last() {
            if t <= last.t_us_from_ready {
                trace!(t, last = last.t_us_from_ready, "dropping stale device frame");
                return false;
            }
        }
        self.samples.push(Sample {
            t_us_from_ready: t,
            state_code,
            index_tip: joints.index_tip,
            thumb_tip: joints.thumb_tip,
            index_mcp: joints.index_mcp,
        });
        true
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn pulse_us_from_ready(&self) -> Option<i64> {
        self.pulse_us_from_ready
    }

    /// Index of the single sample that carries the pulse flag.
    pub fn pulse_row(&self) -> Option<usize> {
        let fired = self.pulse_us_from_ready?;
        self.samples.iter().position(|s| s.t_us_from_ready >= fired)
    }

    /// Stops recording and writes the right and left files.
    pub fn end_and_save(&mut self) -> RecorderResult<SavedTrial> {
        if !self.recording {
            return Err(RecorderError::NotRecording);
        }
        self.recording = false;
        let header = self.header.clone().ok_or(RecorderError::NotRecording)?;

        let session_dir = resolve_session_dir(&self.root, header.trial_index);
        let file = trial_filename(header.trial_index);
        let pulse_row = self.pulse_row();

        let right = self.write_hand(&session_dir, &file, &header, Chirality::Right, pulse_row)?;
        let left = self.write_hand(&session_dir, &file, &header, Chirality::Left, pulse_row)?;

        Ok(SavedTrial {
            session_dir,
            right,
            left,
            samples: self.samples.len(),
        })
    }

    fn write_hand(
        &self,
        session_dir: &Path,
        file: &str,
        header: &TrialHeader,
        hand: Chirality,
        pulse_row: Option<usize>,
    ) -> RecorderResult<PathBuf> {
        let dir = session_dir.join(hand_dir(hand));
        std::fs::create_dir_all(&dir).map_err(|source| RecorderError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(file);
        self.write_one(&path, header, hand, pulse_row)?;
        info!(path = %path.display(), samples = self.samples.len(), "wrote trial data");
        Ok(path)
    }

    fn write_one(
        &self,
        path: &Path,
        header: &TrialHeader,
        file_hand: Chirality,
        pulse_row: Option<usize>,
    ) -> RecorderResult<()> {
        let io_err = |source| RecorderError::Io {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source| RecorderError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
        write_header(&mut out, header, file_hand, self.pulse_us_from_ready).map_err(io_err)?;

        let zeroed = !header.hand_mode.is_either() && file_hand != header.used_hand;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(COLUMNS).map_err(csv_err)?;
        for (i, s) in self.samples.iter().enumerate() {
            let ttl = if pulse_row == Some(i) { 1 } else { 0 };
            let [idx, thb, mcp] = if zeroed {
                [Vec3::ZERO; 3]
            } else {
                [s.index_tip, s.thumb_tip, s.index_mcp]
            };
            let t_ms = s.t_us_from_ready as f32 / 1000.0;
            writer
                .write_record([
                    t_ms.to_string(),
                    s.state_code.to_string(),
                    ttl.to_string(),
                    idx.x.to_string(),
                    idx.y.to_string(),
                    idx.z.to_string(),
                    thb.x.to_string(),
                    thb.y.to_string(),
                    thb.z.to_string(),
                    mcp.x.to_string(),
                    mcp.y.to_string(),
                    mcp.z.to_string(),
                ])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}

fn write_header(
    out: &mut impl Write,
    h: &TrialHeader,
    file_hand: Chirality,
    pulse_us_from_ready: Option<i64>,
) -> std::io::Result<()> {
    let secs = |v: f64| v as f32;
    let pulse_s = pulse_us_from_ready.map_or(-1.0, |us| us as f32 / 1_000_000.0);
    writeln!(out, "# trial_index: {}", h.trial_index)?;
    writeln!(out, "# hand_mode: {}", h.hand_mode.code())?;
    writeln!(out, "# used_hand: {}", h.used_hand.as_str())?;
    writeln!(out, "# this_file_hand: {}", file_hand.as_str())?;
    writeln!(out, "# target_id: {}", h.target_id)?;
    writeln!(out, "# target_pos_m: {},{},{}", h.target.x, h.target.y, h.target.z)?;
    writeln!(out, "# target_radius_m: {}", h.target_radius_m)?;
    writeln!(out, "# start_pos_m: {},{},{}", h.start.x, h.start.y, h.start.z)?;
    writeln!(out, "# start_radius_m: {}", h.start_radius_m)?;
    writeln!(
        out,
        "# timing_s: hold={}, goDelay={}, moveTimeout={}, feedback={}",
        secs(h.hold_s),
        secs(h.go_delay_s),
        secs(h.move_timeout_s),
        secs(h.feedback_s)
    )?;
    writeln!(
        out,
        "# times_s: ready={}, go={}",
        secs(h.ready_time_s),
        h.go_time_s.map_or(-1.0, secs)
    )?;
    writeln!(out, "# ttl_offset_ms: {}", h.pulse_offset_ms)?;
    writeln!(out, "# ttl_fired_s_fromReady: {pulse_s}")?;
    Ok(())
}
