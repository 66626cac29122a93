use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsStatus {
    #[default]
    Initializing,
    Searching,
    Fixed,
}

impl GpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Searching => "searching",
            Self::Fixed => "fixed",
        }
    }
}

/// Position state published by the location task. Always handed out by value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LocationSnapshot {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub course_deg: Option<f64>,
    pub fix_quality: u8,
    pub satellites: u32,
    pub status: GpsStatus,
    pub observed_at: Option<DateTime<Local>>,
}

impl LocationSnapshot {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && self.fix_quality > 0
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if self.fix_quality > 0 => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn maps_link(&self) -> Option<String> {
        self.coordinates()
            .map(|(lat, lon)| format!("https://maps.google.com/maps?q={},{}", lat, lon))
    }

    pub fn describe(&self) -> String {
        match self.coordinates() {
            Some((lat, lon)) => format!("Lat: {:.6}, Lon: {:.6}", lat, lon),
            None => "Location not available".to_string(),
        }
    }
}
