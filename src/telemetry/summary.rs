//! Statistical summary of one monitoring session, computed from its telemetry rows.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use super::row::TelemetryRow;
use crate::error::TelemetryError;
use crate::utils::{format_datetime, round_to};

const HIGH_MOVEMENT_G: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub duration_minutes: f64,
    pub total_samples: usize,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HeartRateZones {
    /// < 70 bpm
    pub resting: usize,
    /// 70..85 bpm
    pub moderate: usize,
    /// >= 85 bpm
    pub elevated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateSummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Percentage of rows with a heart rate.
    pub coverage: f64,
    pub variability: f64,
    pub zones: HeartRateZones,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    LightActivity,
    ModerateActivity,
    HighActivity,
}

impl ActivityLevel {
    pub fn from_mean_acceleration(mean_g: f64) -> Self {
        if mean_g < 0.9 {
            Self::Sedentary
        } else if mean_g < 1.2 {
            Self::LightActivity
        } else if mean_g < 1.8 {
            Self::ModerateActivity
        } else {
            Self::HighActivity
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementSummary {
    pub avg_acceleration: f64,
    pub max_acceleration: f64,
    pub movement_variance: f64,
    pub high_movement_events: usize,
    pub activity_level: ActivityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallSummary {
    /// Rows the classifier labelled as a fall.
    pub fall_predicted_rows: usize,
    pub alerts_triggered: usize,
    pub alert_times: Vec<String>,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spo2Summary {
    pub available: bool,
    pub average: Option<f64>,
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSummary {
    pub average: f64,
    pub stable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session: SessionInfo,
    /// `None` when no row had a heart rate.
    pub heart_rate: Option<HeartRateSummary>,
    pub movement: MovementSummary,
    pub fall_detection: FallSummary,
    pub spo2: Spo2Summary,
    pub temperature: TemperatureSummary,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation; zero for fewer than two values.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 * 100.0 / whole as f64, 1)
    }
}

impl SessionSummary {
    /// `None` for a session without rows.
    pub fn from_rows(rows: &[TelemetryRow]) -> Option<Self> {
        let first = rows.first()?;
        let last = rows.last()?;
        let total = rows.len();

        let bpm: Vec<f64> = rows.iter().map(|r| r.bpm).filter(|b| *b > 0.0).collect();
        let heart_rate = (!bpm.is_empty()).then(|| {
            let mut zones = HeartRateZones::default();
            for b in &bpm {
                match *b {
                    b if b < 70.0 => zones.resting += 1,
                    b if b < 85.0 => zones.moderate += 1,
                    _ => zones.elevated += 1,
                }
            }
            HeartRateSummary {
                average: round_to(mean(&bpm), 1),
                min: round_to(bpm.iter().cloned().fold(f64::MAX, f64::min), 1),
                max: round_to(bpm.iter().cloned().fold(f64::MIN, f64::max), 1),
                coverage: percent(bpm.len(), total),
                variability: round_to(std_dev(&bpm), 1),
                zones,
            }
        });

        let accel: Vec<f64> = rows.iter().map(|r| r.accel_magnitude).collect();
        let avg_accel = mean(&accel);
        let movement = MovementSummary {
            avg_acceleration: round_to(avg_accel, 3),
            max_acceleration: round_to(accel.iter().cloned().fold(f64::MIN, f64::max), 3),
            movement_variance: round_to(std_dev(&accel), 3),
            high_movement_events: accel.iter().filter(|a| **a > HIGH_MOVEMENT_G).count(),
            activity_level: ActivityLevel::from_mean_acceleration(avg_accel),
        };

        let confidences: Vec<f64> = rows.iter().map(|r| r.fall_confidence).collect();
        let fall_detection = FallSummary {
            fall_predicted_rows: rows.iter().filter(|r| r.fall_predicted).count(),
            alerts_triggered: rows.iter().filter(|r| r.alert_triggered).count(),
            alert_times: rows
                .iter()
                .filter(|r| r.alert_triggered)
                .map(|r| format_datetime(&r.captured_at))
                .collect(),
            avg_confidence: round_to(mean(&confidences), 3),
        };

        let spo2: Vec<f64> = rows.iter().filter_map(|r| r.spo2).collect();
        let spo2 = Spo2Summary {
            available: !spo2.is_empty(),
            average: (!spo2.is_empty()).then(|| round_to(mean(&spo2), 1)),
            coverage: percent(spo2.len(), total),
        };

        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        let temperature = TemperatureSummary {
            average: round_to(mean(&temps), 1),
            stable: std_dev(&temps) < 1.0,
        };

        let duration_secs = (last.captured_at - first.captured_at).num_milliseconds() as f64 / 1000.0;
        Some(Self {
            session: SessionInfo {
                duration_minutes: round_to(duration_secs / 60.0, 2),
                total_samples: total,
                start_time: format_datetime(&first.captured_at),
                end_time: format_datetime(&last.captured_at),
            },
            heart_rate,
            movement,
            fall_detection,
            spo2,
            temperature,
        })
    }

    /// `<log>.summary.json` next to the telemetry log.
    pub fn path_for(log_path: &Path) -> PathBuf {
        let mut name = log_path.as_os_str().to_owned();
        name.push(".summary.json");
        PathBuf::from(name)
    }

    pub fn write_next_to(&self, log_path: &Path) -> Result<PathBuf, TelemetryError> {
        let path = Self::path_for(log_path);
        let file = File::create(&path).map_err(|source| TelemetryError::Open {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::from)?;
        writer.flush()?;
        info!("Session summary written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::row::tests::sample_row;
    use chrono::Duration;

    fn session() -> Vec<TelemetryRow> {
        let base = sample_row(false);
        let mut rows = Vec::new();
        for (i, bpm) in [0.0, 65.0, 72.0, 80.0, 90.0].into_iter().enumerate() {
            let mut row = base.clone();
            row.captured_at = base.captured_at + Duration::seconds(30 * i as i64);
            row.bpm = bpm;
            row.finger_detected = bpm > 0.0;
            row.spo2 = (bpm > 0.0).then_some(97.0);
            row.accel_magnitude = if i == 3 { 2.5 } else { 1.0 };
            row.fall_predicted = i == 3;
            row.alert_triggered = i == 3;
            row.fall_confidence = 0.9;
            row.temperature = 31.0;
            rows.push(row);
        }
        rows
    }

    #[test]
    fn empty_session_has_no_summary() {
        assert_eq!(SessionSummary::from_rows(&[]), None);
    }

    #[test]
    fn summarises_vitals_and_movement() {
        let summary = SessionSummary::from_rows(&session()).unwrap();

        assert_eq!(summary.session.total_samples, 5);
        assert_eq!(summary.session.duration_minutes, 2.0);

        let hr = summary.heart_rate.unwrap();
        assert_eq!(hr.average, 76.8);
        assert_eq!((hr.min, hr.max), (65.0, 90.0));
        assert_eq!(hr.coverage, 80.0);
        assert_eq!(
            hr.zones,
            HeartRateZones {
                resting: 1,
                moderate: 2,
                elevated: 1
            }
        );

        assert_eq!(summary.movement.avg_acceleration, 1.3);
        assert_eq!(summary.movement.max_acceleration, 2.5);
        assert_eq!(summary.movement.high_movement_events, 1);
        assert_eq!(summary.movement.activity_level, ActivityLevel::ModerateActivity);

        assert_eq!(summary.fall_detection.fall_predicted_rows, 1);
        assert_eq!(summary.fall_detection.alerts_triggered, 1);
        assert_eq!(summary.fall_detection.alert_times.len(), 1);

        assert!(summary.spo2.available);
        assert_eq!(summary.spo2.average, Some(97.0));
        assert_eq!(summary.spo2.coverage, 80.0);
        assert!(summary.temperature.stable);
    }

    #[test]
    fn no_heart_rate_rows() {
        let mut rows = session();
        for row in &mut rows {
            row.bpm = 0.0;
            row.spo2 = None;
        }
        let summary = SessionSummary::from_rows(&rows).unwrap();
        assert!(summary.heart_rate.is_none());
        assert!(!summary.spo2.available);
        assert_eq!(summary.spo2.coverage, 0.0);
    }

    #[test]
    fn activity_thresholds() {
        assert_eq!(ActivityLevel::from_mean_acceleration(0.5), ActivityLevel::Sedentary);
        assert_eq!(ActivityLevel::from_mean_acceleration(1.0), ActivityLevel::LightActivity);
        assert_eq!(ActivityLevel::from_mean_acceleration(1.5), ActivityLevel::ModerateActivity);
        assert_eq!(ActivityLevel::from_mean_acceleration(1.8), ActivityLevel::HighActivity);
    }

    #[test]
    fn written_next_to_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("fall_detection_data_20240101_120000.csv");
        let summary = SessionSummary::from_rows(&session()).unwrap();

        let path = summary.write_next_to(&log).unwrap();
        assert_eq!(path, dir.path().join("fall_detection_data_20240101_120000.csv.summary.json"));

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["movement"]["activity_level"], "moderate_activity");
        assert_eq!(value["session"]["total_samples"], 5);
    }
}
