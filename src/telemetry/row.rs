use chrono::{DateTime, Local};

use crate::error::TelemetryError;
use crate::types::{ClassificationResult, MotionFrame, VitalsSnapshot};
use crate::utils::{format_datetime, local_from_millis};

/// Column order of the telemetry file.
pub const HEADER: [&str; 20] = [
    "timestamp",
    "datetime",
    "ax",
    "ay",
    "az",
    "gx",
    "gy",
    "gz",
    "temp",
    "bpm",
    "spo2",
    "finger_detected",
    "fall_predicted",
    "fall_confidence",
    "accel_magnitude",
    "gyro_magnitude",
    "accel_delta",
    "gyro_delta",
    "vertical_deviation",
    "alert_triggered",
];

/// One processed sampling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRow {
    pub captured_at: DateTime<Local>,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub temperature: f64,
    pub bpm: f64,
    pub spo2: Option<f64>,
    pub finger_detected: bool,
    pub fall_predicted: bool,
    pub fall_confidence: f64,
    pub accel_magnitude: f64,
    pub gyro_magnitude: f64,
    pub accel_delta: f64,
    pub gyro_delta: f64,
    pub vertical_deviation: f64,
    pub alert_triggered: bool,
}

pub fn header_line() -> String {
    HEADER.join(",")
}

fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

impl TelemetryRow {
    pub fn from_cycle(
        frame: &MotionFrame,
        vitals: &VitalsSnapshot,
        classification: &ClassificationResult,
        alert_triggered: bool,
    ) -> Self {
        let features = &classification.features;
        Self {
            captured_at: frame.captured_at,
            ax: frame.ax,
            ay: frame.ay,
            az: frame.az,
            gx: frame.gx,
            gy: frame.gy,
            gz: frame.gz,
            temperature: frame.temperature,
            bpm: vitals.heart_rate_bpm,
            spo2: vitals.spo2,
            finger_detected: vitals.finger_detected,
            fall_predicted: classification.is_fall,
            fall_confidence: classification.confidence,
            accel_magnitude: features.accel_magnitude,
            gyro_magnitude: features.gyro_magnitude,
            accel_delta: features.accel_delta,
            gyro_delta: features.gyro_delta,
            vertical_deviation: features.vertical_deviation,
            alert_triggered,
        }
    }

    pub fn to_csv_line(&self) -> String {
        let millis = self.captured_at.timestamp_millis();
        let spo2 = self.spo2.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{}.{:03},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            millis.div_euclid(1000),
            millis.rem_euclid(1000),
            format_datetime(&self.captured_at),
            self.ax,
            self.ay,
            self.az,
            self.gx,
            self.gy,
            self.gz,
            self.temperature,
            self.bpm,
            spo2,
            flag(self.finger_detected),
            flag(self.fall_predicted),
            self.fall_confidence,
            self.accel_magnitude,
            self.gyro_magnitude,
            self.accel_delta,
            self.gyro_delta,
            self.vertical_deviation,
            flag(self.alert_triggered),
        )
    }

    /// Parse a line written by [`to_csv_line`](Self::to_csv_line). Lines with
    /// only the 16 leading columns are accepted; the trailing columns default
    /// to zero / `False`.
    pub fn parse(line: &str) -> Result<Self, TelemetryError> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() != HEADER.len() && fields.len() != 16 {
            return Err(TelemetryError::Parse(format!(
                "expected {} columns, found {}",
                HEADER.len(),
                fields.len()
            )));
        }

        let number = |i: usize| -> Result<f64, TelemetryError> {
            fields[i]
                .trim()
                .parse::<f64>()
                .map_err(|_| TelemetryError::Parse(format!("{} = '{}'", HEADER[i], fields[i])))
        };
        let boolean = |i: usize| -> Result<bool, TelemetryError> {
            match fields[i].trim() {
                "True" | "true" | "1" => Ok(true),
                "False" | "false" | "0" => Ok(false),
                other => Err(TelemetryError::Parse(format!("{} = '{}'", HEADER[i], other))),
            }
        };

        let timestamp = number(0)?;
        let captured_at = local_from_millis((timestamp * 1000.0).round() as i64)
            .ok_or_else(|| TelemetryError::Parse(format!("timestamp out of range: {}", timestamp)))?;
        let spo2 = match fields[10].trim() {
            "" => None,
            _ => Some(number(10)?),
        };
        let extended = fields.len() == HEADER.len();

        Ok(Self {
            captured_at,
            ax: number(2)?,
            ay: number(3)?,
            az: number(4)?,
            gx: number(5)?,
            gy: number(6)?,
            gz: number(7)?,
            temperature: number(8)?,
            bpm: number(9)?,
            spo2,
            finger_detected: boolean(11)?,
            fall_predicted: boolean(12)?,
            fall_confidence: number(13)?,
            accel_magnitude: number(14)?,
            gyro_magnitude: number(15)?,
            accel_delta: if extended { number(16)? } else { 0.0 },
            gyro_delta: if extended { number(17)? } else { 0.0 },
            vertical_deviation: if extended { number(18)? } else { 0.0 },
            alert_triggered: if extended { boolean(19)? } else { false },
        })
    }
}
