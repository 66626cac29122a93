use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use log::info;

use crate::config::GpsConfig;
use crate::error::SensorError;

/// Line source for the location tracker.
pub type NmeaFeed = Box<dyn BufRead + Send>;

/// Open the configured positioning feed: a recorded NMEA file when
/// `replay_file` is set, the serial receiver otherwise.
pub fn open_feed(config: &GpsConfig) -> Result<NmeaFeed, SensorError> {
    if let Some(path) = &config.replay_file {
        let file = File::open(path)
            .map_err(|e| SensorError::unavailable("gnss", format!("cannot open replay file {}: {}", path, e)))?;
        info!("Replaying NMEA sentences from {}", path);
        return Ok(Box::new(BufReader::new(file)));
    }

    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| {
            SensorError::unavailable(
                "gnss",
                format!("failed to open serial port {} @ {}: {}", config.port, config.baud_rate, e),
            )
        })?;
    info!("GNSS receiver on {} @ {} baud", config.port, config.baud_rate);
    Ok(Box::new(BufReader::new(port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replay_file_is_read_line_by_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "$GPGGA,first").unwrap();
        writeln!(file, "$GPRMC,second").unwrap();

        let config = GpsConfig {
            replay_file: Some(file.path().to_string_lossy().into_owned()),
            ..GpsConfig::default()
        };
        let lines: Vec<String> = open_feed(&config).unwrap().lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["$GPGGA,first", "$GPRMC,second"]);
    }

    #[test]
    fn missing_port_is_unavailable() {
        let config = GpsConfig {
            port: "/dev/does-not-exist-vitalwatch".to_string(),
            ..GpsConfig::default()
        };
        let err = open_feed(&config).err().unwrap();
        assert_eq!(err.fault_kind(), crate::error::FaultKind::SensorUnavailable);
    }
}
