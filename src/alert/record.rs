use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::types::{ClassificationResult, LocationSnapshot, MotionFrame, VitalsSnapshot};
use crate::utils::{format_datetime, round_to};

pub const EVENT_FALL_DETECTED: &str = "fall_detected";
const LOCATION_UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallData {
    pub fall_number: u32,
    pub confidence: f64,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub accel_magnitude: f64,
    pub gyro_magnitude: f64,
    pub temperature: f64,
}

/// Position attached to an alert: the last valid fix, or an explicit marker.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertLocation {
    Known(LocationSnapshot),
    Unavailable,
}

impl Serialize for AlertLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(snapshot) => snapshot.serialize(serializer),
            Self::Unavailable => serializer.serialize_str(LOCATION_UNAVAILABLE),
        }
    }
}

/// One emergency event, as written to every alert channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub timestamp: DateTime<Local>,
    pub event_type: &'static str,
    pub fall_data: FallData,
    pub gps_location: AlertLocation,
    pub maps_link: Option<String>,
    /// GPS status at the time of the alert, kept for the operator message.
    #[serde(skip)]
    pub gps_status: &'static str,
}

impl AlertRecord {
    pub fn compose(
        timestamp: DateTime<Local>,
        classification: &ClassificationResult,
        vitals: &VitalsSnapshot,
        frame: &MotionFrame,
        fall_number: u32,
        location: &LocationSnapshot,
    ) -> Self {
        let (gps_location, maps_link) = if location.is_valid() {
            (AlertLocation::Known(location.clone()), location.maps_link())
        } else {
            (AlertLocation::Unavailable, None)
        };

        Self {
            timestamp,
            event_type: EVENT_FALL_DETECTED,
            fall_data: FallData {
                fall_number,
                confidence: classification.confidence,
                heart_rate: vitals.finger_detected.then_some(round_to(vitals.heart_rate_bpm, 1)),
                spo2: vitals.spo2.map(|v| round_to(v, 1)),
                accel_magnitude: round_to(classification.features.accel_magnitude, 4),
                gyro_magnitude: round_to(classification.features.gyro_magnitude, 4),
                temperature: frame.temperature,
            },
            gps_location,
            maps_link,
            gps_status: location.status.as_str(),
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn location_text(&self) -> String {
        match &self.gps_location {
            AlertLocation::Known(snapshot) => snapshot.describe(),
            AlertLocation::Unavailable => "Location not available".to_string(),
        }
    }

    /// Operator-facing text for console style channels.
    pub fn render_message(&self) -> String {
        let data = &self.fall_data;
        let mut lines = vec![
            "EMERGENCY FALL ALERT".to_string(),
            format!("Time: {}", format_datetime(&self.timestamp)),
            format!("Fall #{} (confidence {:.1}%)", data.fall_number, data.confidence * 100.0),
            format!("Location: {}", self.location_text()),
            format!("GPS Status: {}", self.gps_status),
        ];
        match &self.maps_link {
            Some(link) => lines.push(format!("Maps: {}", link)),
            None => lines.push("GPS location not available".to_string()),
        }
        lines.push("Sensor data:".to_string());
        lines.push(match data.heart_rate {
            Some(bpm) => format!("- Heart Rate: {:.0} BPM", bpm),
            None => "- Heart Rate: N/A".to_string(),
        });
        lines.push(match data.spo2 {
            Some(spo2) => format!("- SpO2: {:.1}%", spo2),
            None => "- SpO2: N/A".to_string(),
        });
        lines.push(format!("- Acceleration: {:.2}g", data.accel_magnitude));
        lines.push(format!("- Rotation: {:.1}°/s", data.gyro_magnitude));
        lines.push(format!("- Temperature: {:.1}°C", data.temperature));
        lines.push("Please check on the person immediately!".to_string());
        lines.join("\n")
    }
}
