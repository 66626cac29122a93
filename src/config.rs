use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Bounds checked by `AppConfig::validate`. Durations derived from validated
// values always fit in a `Duration`.
const MIN_RATE_HZ: f64 = 0.1;
const MAX_RATE_HZ: f64 = 1000.0;
const MAX_PERIOD_SECS: f64 = 3600.0;
const MAX_READ_ATTEMPTS: u32 = 10;
const MAX_BACKOFF_STEP_MS: u64 = 1000;

/// Top-level configuration, one section per subsystem. Every field has a
/// default, so a partial file is enough.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampling: SamplingConfig,
    pub imu: ImuConfig,
    pub vitals: VitalsConfig,
    pub gps: GpsConfig,
    pub classifier: ClassifierConfig,
    pub alerts: AlertConfig,
    pub telemetry: TelemetryConfig,
}

/// Fixed-cadence sampling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub rate_hz: f64,
    pub status_interval_secs: f64,
    pub shutdown_join_timeout_ms: u64,
    /// Log a recurring failure on its first occurrence and then every Nth.
    pub failure_log_every: u64,
}

/// Where inertial frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImuSource {
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    pub source: ImuSource,
    pub address: u8,
    pub read_attempts: u32,
    pub backoff_step_ms: u64,
    /// Simulated bus only: inject a synthetic fall every N seconds.
    pub simulated_fall_every_secs: Option<f64>,
    /// Simulated bus only: probability that a transaction is NACKed.
    pub simulated_nack_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub window_size: usize,
    pub smoothing: usize,
    pub sample_rate_hz: f64,
    pub finger_threshold: f64,
    /// Heart rate produced by the simulated PPG source.
    pub simulated_bpm: f64,
    pub simulated_spo2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub enabled: bool,
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Replay a recorded NMEA file instead of opening the serial port.
    pub replay_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: Option<String>,
    pub confidence_threshold: f64,
    pub refractory_secs: f64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub event_log_path: String,
    pub console: bool,
    pub emergency_contacts: Vec<String>,
    pub mqtt: Option<MqttAlertConfig>,
}

/// Optional MQTT alert channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttAlertConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub directory: String,
    pub file_prefix: String,
    pub write_summary: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10.0,
            status_interval_secs: 2.0,
            shutdown_join_timeout_ms: 2000,
            failure_log_every: 50,
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            source: ImuSource::Simulated,
            address: 0x68,
            read_attempts: 3,
            backoff_step_ms: 10,
            simulated_fall_every_secs: None,
            simulated_nack_rate: 0.0,
        }
    }
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 10,
            window_size: 100,
            smoothing: 4,
            sample_rate_hz: 25.0,
            finger_threshold: 50_000.0,
            simulated_bpm: 72.0,
            simulated_spo2: 97.0,
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            replay_file: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: Some("models/fall_model.json".to_string()),
            confidence_threshold: 0.8,
            refractory_secs: 3.0,
            timeout_ms: 50,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            event_log_path: "emergency_log.json".to_string(),
            console: true,
            emergency_contacts: Vec::new(),
            mqtt: None,
        }
    }
}

impl Default for MqttAlertConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "vitalwatch-device".to_string(),
            topic: "vitalwatch/alerts".to_string(),
            keep_alive: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directory: "data".to_string(),
            file_prefix: "fall_detection_data".to_string(),
            write_summary: true,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}

impl ClassifierConfig {
    pub fn refractory(&self) -> Duration {
        Duration::from_secs_f64(self.refractory_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        std::fs::write(path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.sampling.rate_hz) {
            return Err(ConfigError::ValidationError(format!(
                "Sampling rate must be within [{}, {}] Hz",
                MIN_RATE_HZ, MAX_RATE_HZ
            )));
        }

        if !(self.sampling.status_interval_secs > 0.0 && self.sampling.status_interval_secs <= MAX_PERIOD_SECS) {
            return Err(ConfigError::ValidationError(format!(
                "Status interval must be within (0, {}] seconds",
                MAX_PERIOD_SECS
            )));
        }

        if !(1..=MAX_READ_ATTEMPTS).contains(&self.imu.read_attempts) {
            return Err(ConfigError::ValidationError(format!(
                "IMU read attempts must be within [1, {}]",
                MAX_READ_ATTEMPTS
            )));
        }

        if self.imu.backoff_step_ms > MAX_BACKOFF_STEP_MS {
            return Err(ConfigError::ValidationError(format!(
                "IMU backoff step must not exceed {} ms",
                MAX_BACKOFF_STEP_MS
            )));
        }

        if let Some(every) = self.imu.simulated_fall_every_secs {
            if !(every > 0.0 && every <= MAX_PERIOD_SECS) {
                return Err(ConfigError::ValidationError(format!(
                    "Simulated fall period must be within (0, {}] seconds",
                    MAX_PERIOD_SECS
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.imu.simulated_nack_rate) {
            return Err(ConfigError::ValidationError("Simulated NACK rate must be within [0, 1]".to_string()));
        }

        if self.vitals.window_size < 2 || self.vitals.smoothing == 0 {
            return Err(ConfigError::ValidationError(
                "Vitals window must hold at least 2 samples and smoothing must be positive".to_string(),
            ));
        }

        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.vitals.sample_rate_hz) {
            return Err(ConfigError::ValidationError(format!(
                "PPG sample rate must be within [{}, {}] Hz",
                MIN_RATE_HZ, MAX_RATE_HZ
            )));
        }

        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "Confidence threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=MAX_PERIOD_SECS).contains(&self.classifier.refractory_secs) {
            return Err(ConfigError::ValidationError(format!(
                "Refractory period must be within [0, {}] seconds",
                MAX_PERIOD_SECS
            )));
        }

        if self.classifier.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("Classifier timeout must be positive".to_string()));
        }

        if self.telemetry.file_prefix.is_empty() {
            return Err(ConfigError::ValidationError("Telemetry file prefix must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn telemetry_directory(&self) -> PathBuf {
        PathBuf::from(&self.telemetry.directory)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Serialize error: {0}")]
    SerializeError(toml::ser::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling.interval(), Duration::from_millis(100));
        assert_eq!(config.imu.read_attempts, 3);
        assert_eq!(config.classifier.confidence_threshold, 0.8);
        assert_eq!(config.classifier.refractory(), Duration::from_secs(3));
        assert_eq!(config.vitals.window_size, 100);
        assert_eq!(config.vitals.smoothing, 4);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [classifier]
            confidence_threshold = 0.9
            refractory_secs = 5.0

            [alerts.mqtt]
            topic = "ward-3/alerts"
            "#,
        )
        .unwrap();

        assert_eq!(config.classifier.confidence_threshold, 0.9);
        assert_eq!(config.classifier.timeout_ms, 50);
        assert_eq!(config.sampling.rate_hz, 10.0);
        let mqtt = config.alerts.mqtt.unwrap();
        assert_eq!(mqtt.topic, "ward-3/alerts");
        assert_eq!(mqtt.port, 1883);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.classifier.confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = AppConfig::default();
        config.imu.read_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sampling.rate_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_values_too_large_for_a_duration() {
        let mut config = AppConfig::default();
        config.sampling.rate_hz = 1e-300;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sampling.status_interval_secs = 1e300;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.classifier.refractory_secs = f64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.classifier.refractory_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.imu.simulated_fall_every_secs = Some(1e20);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.imu.backoff_step_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.imu.read_attempts = u32::MAX;
        assert!(config.validate().is_err());

        // Upper edges are accepted and convert without panicking.
        let mut config = AppConfig::default();
        config.sampling.rate_hz = MIN_RATE_HZ;
        config.sampling.status_interval_secs = MAX_PERIOD_SECS;
        config.classifier.refractory_secs = MAX_PERIOD_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling.interval(), Duration::from_secs(10));
        assert_eq!(config.classifier.refractory(), Duration::from_secs(3600));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitalwatch.toml");

        let mut config = AppConfig::default();
        config.sampling.rate_hz = 20.0;
        config.gps.enabled = false;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.sampling.rate_hz, 20.0);
        assert!(!loaded.gps.enabled);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.telemetry.file_prefix, "fall_detection_data");
    }
}
