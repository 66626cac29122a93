pub mod row;
pub mod writer;
pub mod reader;
pub mod summary;

pub use reader::{latest_log_file, latest_row, read_rows, DeviceStatus, LiveReading};
pub use row::TelemetryRow;
pub use summary::SessionSummary;
pub use writer::TelemetryLog;
