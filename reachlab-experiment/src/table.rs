//! Target and session tables as authored for a participant.
//!
//! Targets: `ID,cm,x,y,z`. Trials: `#,target,hand,startx,starty,startz,ttl,vf`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{TableError, TableResult};

pub const TARGETS_PREFIX: &str = "targets_";
pub const TRIALS_PREFIX: &str = "session_";

/// One row of the targets table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRow {
    #[serde(rename = "ID")]
    pub id: u32,
    /// Diameter in centimetres.
    pub cm: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl TargetRow {
    pub fn radius_m(&self) -> f32 {
        self.cm / 100.0 * 0.5
    }
}

/// One row of the session (trials) table. `target`, `hand` and `vf` stay as
/// text until the session is built so that bad cells skip a trial instead of
/// failing the whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    #[serde(rename = "#")]
    pub trial: u32,
    pub target: String,
    pub hand: String,
    pub startx: f32,
    pub starty: f32,
    pub startz: f32,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub ttl: Option<f32>,
    pub vf: String,
}

impl TrialRow {
    pub fn pulse_offset_ms(&self) -> f32 {
        self.ttl.unwrap_or(0.0)
    }

    pub fn visual_feedback(&self) -> bool {
        parse_flag(&self.vf, true)
    }
}

/// Lenient boolean cell: numbers (non-zero is true) and common words.
pub fn parse_flag(text: &str, default: bool) -> bool {
    let t = text.trim().to_ascii_lowercase();
    if t.is_empty() {
        return default;
    }
    if let Ok(v) = t.parse::<i64>() {
        return v != 0;
    }
    match t.as_str() {
        "true" | "yes" | "y" | "on" => true,
        "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

fn read_rows<T>(path: &Path) -> TableResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!(path = %path.display(), row = line + 1, error = %e, "skipping unparseable row"),
        }
    }
    Ok(rows)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> TableResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TableError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_err = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn read_targets(path: &Path) -> TableResult<Vec<TargetRow>> {
    let rows = read_rows(path)?;
    debug!(path = %path.display(), count = rows.len(), "loaded targets");
    Ok(rows)
}

pub fn read_trials(path: &Path) -> TableResult<Vec<TrialRow>> {
    let rows = read_rows(path)?;
    debug!(path = %path.display(), count = rows.len(), "loaded trials");
    Ok(rows)
}

pub fn write_targets(path: &Path, rows: &[TargetRow]) -> TableResult<()> {
    write_rows(path, rows)
}

pub fn write_trials(path: &Path, rows: &[TrialRow]) -> TableResult<()> {
    write_rows(path, rows)
}

fn timestamped_name(prefix: &str) -> String {
    format!("{prefix}{}.csv", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn require_folder(folder: &Path) -> TableResult<()> {
    if folder.as_os_str().is_empty() {
        return Err(TableError::MissingFolder(folder.to_path_buf()));
    }
    Ok(())
}

/// Writes `targets_<timestamp>.csv` into the participant folder.
pub fn save_targets(folder: &Path, rows: &[TargetRow]) -> TableResult<PathBuf> {
    require_folder(folder)?;
    if rows.is_empty() {
        return Err(TableError::Empty("targets"));
    }
    let path = folder.join(timestamped_name(TARGETS_PREFIX));
    write_targets(&path, rows)?;
    info!(path = %path.display(), "saved targets table");
    Ok(path)
}

/// Writes `session_<timestamp>.csv` into the participant folder.
pub fn save_trials(folder: &Path, rows: &[TrialRow]) -> TableResult<PathBuf> {
    require_folder(folder)?;
    if rows.is_empty() {
        return Err(TableError::Empty("trials"));
    }
    let path = folder.join(timestamped_name(TRIALS_PREFIX));
    write_trials(&path, rows)?;
    info!(path = %path.display(), "saved session table");
    Ok(path)
}

/// Most recently modified `<prefix>*.csv` file directly inside `folder`.
pub fn find_latest_table(folder: &Path, prefix: &'static str) -> TableResult<PathBuf> {
    if !folder.is_dir() {
        return Err(TableError::MissingFolder(folder.to_path_buf()));
    }
    let entries = std::fs::read_dir(folder).map_err(|source| TableError::Io {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(".csv") || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = latest.as_ref().map_or(true, |(t, p)| {
            modified > *t || (modified == *t && path > *p)
        });
        if newer {
            latest = Some((modified, path));
        }
    }

    latest.map(|(_, p)| p).ok_or_else(|| TableError::NotFound {
        prefix,
        folder: folder.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "reachlab_table_{tag}_{}_{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn targets_round_trip() {
        let dir = scratch_dir("targets");
        let rows = vec![
            TargetRow { id: 1, cm: 6.0, x: 0.2, y: 0.0, z: 0.15 },
            TargetRow { id: 2, cm: 3.5, x: -0.125, y: 0.01, z: 0.3 },
        ];
        let path = dir.join("targets.csv");
        write_targets(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ID,cm,x,y,z\n"));

        let back = read_targets(&path).unwrap();
        assert_eq!(back.len(), rows.len());
        for (a, b) in rows.iter().zip(&back) {
            assert_eq!(a.id, b.id);
            assert_relative_eq!(a.cm, b.cm);
            assert_relative_eq!(a.x, b.x);
            assert_relative_eq!(a.y, b.y);
            assert_relative_eq!(a.z, b.z);
        }
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn trials_round_trip() {
        let dir = scratch_dir("trials");
        let rows = vec![
            TrialRow {
                trial: 1,
                target: "2".into(),
                hand: "0".into(),
                startx: 0.0,
                starty: 0.05,
                startz: -0.1,
                ttl: Some(-150.5),
                vf: "1".into(),
            },
            TrialRow {
                trial: 2,
                target: "1".into(),
                hand: "2".into(),
                startx: 0.01,
                starty: 0.0,
                startz: 0.0,
                ttl: Some(0.0),
                vf: "0".into(),
            },
        ];
        let path = dir.join("session.csv");
        write_trials(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#,target,hand,startx,starty,startz,ttl,vf\n"));

        let back = read_trials(&path).unwrap();
        assert_eq!(back, rows);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn lenient_cells_fall_back_to_defaults() {
        let dir = scratch_dir("lenient");
        let path = dir.join("session.csv");
        std::fs::write(
            &path,
            "#, target, hand, startx , starty,startz, ttl, vf\n\
             1, 3, left, 0, 0, 0, abc, \n\
             oops, 3, 1, 0, 0, 0, 0, 1\n\
             2, 3, 1, 0.1, 0, 0.2, 25, off\n",
        )
        .unwrap();

        let rows = read_trials(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pulse_offset_ms(), 0.0);
        assert!(rows[0].visual_feedback());
        assert_eq!(rows[1].pulse_offset_ms(), 25.0);
        assert!(!rows[1].visual_feedback());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("1", false));
        assert!(!parse_flag("0", true));
        assert!(parse_flag("Yes", false));
        assert!(!parse_flag("off", true));
        assert!(parse_flag("maybe", true));
        assert!(!parse_flag("  ", false));
    }

    #[test]
    fn latest_table_ignores_session_output_folders() {
        let dir = scratch_dir("latest");
        std::fs::create_dir_all(dir.join("session_001")).unwrap();
        std::fs::write(dir.join("session_20240101_000000.csv"), "#\n").unwrap();
        std::fs::write(dir.join("targets_20240101_000000.csv"), "ID\n").unwrap();

        let found = find_latest_table(&dir, TRIALS_PREFIX).unwrap();
        assert_eq!(
            found.file_name().and_then(|n| n.to_str()),
            Some("session_20240101_000000.csv")
        );
        assert!(matches!(
            find_latest_table(&dir.join("missing"), TARGETS_PREFIX),
            Err(TableError::MissingFolder(_))
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn save_refuses_empty_tables() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            save_targets(&dir, &[]),
            Err(TableError::Empty("targets"))
        ));
        let _ = std::fs::remove_dir_all(dir);
    }
}
