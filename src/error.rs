use std::io;
use std::path::PathBuf;

/// Broad classes of recoverable faults, used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Bus timeout/NACK: retried, then the cycle is skipped.
    TransientIo,
    /// A sensor failed to initialise; the pipeline runs without that signal.
    SensorUnavailable,
    /// The scoring artifact is missing or failing; fall detection degrades to safe.
    ClassificationUnavailable,
    /// One alert channel failed; the others still fire.
    ChannelDispatch,
    /// Unparseable input; discarded, previous state kept.
    MalformedInput,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("device 0x{addr:02X} did not acknowledge")]
    Nack { addr: u8 },
    #[error("bus transaction timed out")]
    Timeout,
    #[error("bus I/O error: {0}")]
    Io(String),
}

impl BusError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::TransientIo
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("{sensor} unavailable: {reason}")]
    Unavailable { sensor: &'static str, reason: String },
}

impl SensorError {
    pub fn unavailable(sensor: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            sensor,
            reason: reason.into(),
        }
    }

    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::SensorUnavailable
    }
}

/// The inertial reader gave up on a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error("frame read failed after {attempts} attempts: {last}")]
    Failed { attempts: u32, last: BusError },
}

impl ReadError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::TransientIo
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("scoring artifact unavailable: {0}")]
    Unavailable(String),
    #[error("scoring artifact is malformed: {0}")]
    MalformedArtifact(String),
    #[error("features rejected by scorer: {0}")]
    MalformedInput(String),
    #[error("scorer did not answer within {0} ms")]
    Timeout(u64),
}

impl ScoreError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Self::MalformedInput(_) => FaultKind::MalformedInput,
            _ => FaultKind::ClassificationUnavailable,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("alert channel {channel} I/O error: {source}")]
    Io {
        channel: String,
        #[source]
        source: io::Error,
    },
    #[error("alert channel {channel} failed to encode record: {source}")]
    Encode {
        channel: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("alert channel {channel} rejected the alert: {reason}")]
    Rejected { channel: String, reason: String },
}

impl DispatchError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::ChannelDispatch
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NmeaError {
    #[error("sentence does not start with '$'")]
    MissingStart,
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },
    #[error("invalid checksum field '{0}'")]
    BadChecksumField(String),
    #[error("{kind} sentence has {found} fields, need at least {needed}")]
    TooFewFields {
        kind: &'static str,
        found: usize,
        needed: usize,
    },
    #[error("invalid {field} value '{value}'")]
    BadField { field: &'static str, value: String },
}

impl NmeaError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::MalformedInput
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("cannot open telemetry log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read telemetry log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("telemetry write failed: {0}")]
    Write(#[from] io::Error),
    #[error("malformed telemetry row: {0}")]
    Parse(String),
}
