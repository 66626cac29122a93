use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;
use serde::Serialize;

use super::row::TelemetryRow;
use crate::error::TelemetryError;

/// Most recently modified `<prefix>_*.csv` in `directory`.
pub fn latest_log_file<P: AsRef<Path>>(directory: P, prefix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(directory).ok()?;
    let stem = format!("{}_", prefix);

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&stem) && name.ends_with(".csv")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max()
        .map(|(_, path)| path)
}

/// All complete rows of a log that may still be growing.
///
/// A missing file reads as empty. The final line is ignored unless it is
/// newline-terminated, and rows that fail to parse are skipped.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<TelemetryRow>, TelemetryError> {
    let content = match fs::read_to_string(path.as_ref()) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TelemetryError::Read {
                path: path.as_ref().to_path_buf(),
                source,
            })
        }
    };

    let complete = match content.rfind('\n') {
        Some(end) => &content[..=end],
        None => "",
    };

    let mut rows = Vec::new();
    for (index, line) in complete.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match TelemetryRow::parse(line) {
            Ok(row) => rows.push(row),
            Err(e) => debug!("Skipping telemetry line {}: {}", index + 1, e),
        }
    }
    Ok(rows)
}

pub fn latest_row<P: AsRef<Path>>(path: P) -> Result<Option<TelemetryRow>, TelemetryError> {
    Ok(read_rows(path)?.pop())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Latest values for a live view of the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub accel_magnitude: f64,
    pub gyro_magnitude: f64,
    pub fall_detected: bool,
    pub fall_confidence: f64,
    pub temperature: Option<f64>,
    pub captured_at: Option<DateTime<Local>>,
    pub device_status: DeviceStatus,
}

impl LiveReading {
    pub fn offline() -> Self {
        Self {
            heart_rate: None,
            spo2: None,
            accel_magnitude: 0.0,
            gyro_magnitude: 0.0,
            fall_detected: false,
            fall_confidence: 0.0,
            temperature: None,
            captured_at: None,
            device_status: DeviceStatus::Offline,
        }
    }

    pub fn from_row(row: &TelemetryRow) -> Self {
        Self {
            heart_rate: (row.bpm > 0.0).then_some(row.bpm),
            spo2: row.spo2,
            accel_magnitude: row.accel_magnitude,
            gyro_magnitude: row.gyro_magnitude,
            fall_detected: row.fall_predicted,
            fall_confidence: row.fall_confidence,
            temperature: Some(row.temperature),
            captured_at: Some(row.captured_at),
            device_status: DeviceStatus::Online,
        }
    }

    /// Read the newest row of the newest log under `directory`.
    pub fn from_directory<P: AsRef<Path>>(directory: P, prefix: &str) -> Result<Self, TelemetryError> {
        let Some(path) = latest_log_file(directory, prefix) else {
            return Ok(Self::offline());
        };
        Ok(latest_row(path)?
            .map(|row| Self::from_row(&row))
            .unwrap_or_else(Self::offline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::row::header_line;
    use crate::telemetry::row::tests::sample_row;
    use std::io::Write;

    fn write_log(path: &Path, rows: &[TelemetryRow], tail: &str) {
        let mut file = fs::File::create(path).unwrap();
        writeln!(file, "{}", header_line()).unwrap();
        for row in rows {
            writeln!(file, "{}", row.to_csv_line()).unwrap();
        }
        write!(file, "{}", tail).unwrap();
    }

    #[test]
    fn missing_or_empty_file_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_rows(dir.path().join("absent.csv")).unwrap().is_empty());

        let empty = dir.path().join("empty.csv");
        fs::File::create(&empty).unwrap();
        assert!(read_rows(&empty).unwrap().is_empty());
        assert_eq!(latest_row(&empty).unwrap(), None);
    }

    #[test]
    fn unreadable_log_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_rows(dir.path()).unwrap_err();
        match err {
            TelemetryError::Read { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("expected a read error, got {:?}", other),
        }
    }

    #[test]
    fn partial_last_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_20240101_000000.csv");
        let rows = vec![sample_row(false), sample_row(true)];
        let partial = sample_row(false).to_csv_line();
        write_log(&path, &rows, &partial[..partial.len() - 7]);

        let read = read_rows(&path).unwrap();
        assert_eq!(read, rows);
        assert_eq!(latest_row(&path).unwrap(), Some(rows[1].clone()));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_20240101_000000.csv");
        write_log(&path, &[sample_row(false)], "not,a,row\n");
        assert_eq!(read_rows(&path).unwrap().len(), 1);
    }

    #[test]
    fn newest_matching_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_log_file(dir.path(), "run"), None);

        let older = dir.path().join("run_20240101_000000.csv");
        write_log(&older, &[], "");
        std::thread::sleep(std::time::Duration::from_millis(20));
        let newer = dir.path().join("run_20240101_000100.csv");
        write_log(&newer, &[], "");
        fs::write(dir.path().join("other_20990101_000000.csv"), "x").unwrap();

        assert_eq!(latest_log_file(dir.path(), "run"), Some(newer));
    }

    #[test]
    fn live_reading_tracks_device_status() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            LiveReading::from_directory(dir.path(), "run").unwrap().device_status,
            DeviceStatus::Offline
        );

        let path = dir.path().join("run_20240101_000000.csv");
        write_log(&path, &[sample_row(true)], "");
        let live = LiveReading::from_directory(dir.path(), "run").unwrap();
        assert_eq!(live.device_status, DeviceStatus::Online);
        assert!(live.fall_detected);
        assert_eq!(live.heart_rate, Some(73.5));
        assert_eq!(live.spo2, Some(97.8));
    }
}
