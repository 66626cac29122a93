use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use super::row::{header_line, TelemetryRow};
use crate::error::TelemetryError;

/// Append-only CSV log of processed cycles, flushed after every row.
pub struct TelemetryLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl TelemetryLog {
    /// Create `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.csv` and write the header.
    pub fn create<P: AsRef<Path>>(directory: P, prefix: &str) -> Result<Self, TelemetryError> {
        let directory = directory.as_ref();
        let file_name = format!("{}_{}.csv", prefix, Local::now().format("%Y%m%d_%H%M%S"));
        let path = directory.join(file_name);

        let open_error = |source| TelemetryError::Open {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(directory).map_err(open_error)?;
        let file = File::create(&path).map_err(open_error)?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header_line()).map_err(open_error)?;
        writer.flush().map_err(open_error)?;

        info!("Telemetry log created: {}", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &TelemetryRow) -> Result<(), TelemetryError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TelemetryError::Write(std::io::Error::other("telemetry log is closed")))?;
        writeln!(writer, "{}", row.to_csv_line())?;
        writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close. Later appends fail; closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), TelemetryError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            info!(
                "Telemetry log closed: {} ({} rows)",
                self.path.display(),
                self.rows
            );
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for TelemetryLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::row::tests::sample_row;

    #[test]
    fn creates_prefixed_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::create(dir.path().join("data"), "fall_detection_data").unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("fall_detection_data_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "fall_detection_data_".len() + "YYYYmmdd_HHMMSS".len() + ".csv".len());

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, format!("{}\n", header_line()));
    }

    #[test]
    fn rows_are_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TelemetryLog::create(dir.path(), "run").unwrap();
        let row = sample_row(false);
        log.append(&row).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(content.lines().nth(1).unwrap(), row.to_csv_line());
        assert_eq!(log.rows_written(), 1);
    }

    #[test]
    fn closed_log_rejects_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TelemetryLog::create(dir.path(), "run").unwrap();
        log.close().unwrap();
        log.close().unwrap();
        assert!(!log.is_open());
        assert!(log.append(&sample_row(false)).is_err());
    }

    #[test]
    fn unwritable_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let err = TelemetryLog::create(&blocker, "run").err().unwrap();
        assert!(matches!(err, TelemetryError::Open { .. }));
        // Startup logs this message as-is before exiting.
        let message = err.to_string();
        assert!(message.starts_with("cannot open telemetry log"), "{}", message);
        assert!(message.contains("not-a-dir"), "{}", message);
    }
}
