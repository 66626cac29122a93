use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::record::AlertRecord;
use crate::error::DispatchError;

/// One way of getting an alert to a human or a system.
pub trait AlertChannel: Send {
    fn name(&self) -> &str;

    fn send(&mut self, record: &AlertRecord) -> Result<(), DispatchError>;
}

/// Durable append-only event log, one JSON object per line.
pub struct JsonLinesChannel {
    path: PathBuf,
}

impl JsonLinesChannel {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn io_error(&self, source: std::io::Error) -> DispatchError {
        DispatchError::Io {
            channel: self.name().to_string(),
            source,
        }
    }
}

impl AlertChannel for JsonLinesChannel {
    fn name(&self) -> &str {
        "event-log"
    }

    fn send(&mut self, record: &AlertRecord) -> Result<(), DispatchError> {
        let line = record.to_json_line().map_err(|source| DispatchError::Encode {
            channel: self.name().to_string(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Opened per event so every alert hits the disk on its own.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", line).map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;

        info!("Emergency event logged to {}", self.path.display());
        Ok(())
    }
}

/// Operator notification through the application log.
#[derive(Debug, Default)]
pub struct ConsoleChannel;

impl AlertChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&mut self, record: &AlertRecord) -> Result<(), DispatchError> {
        let banner = "=".repeat(60);
        warn!("{}", banner);
        for line in record.render_message().lines() {
            warn!("{}", line);
        }
        warn!("{}", banner);
        Ok(())
    }
}
