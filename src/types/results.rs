/// Success/failure counters reported when the sampling loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub cycles: u64,
    pub frames_ok: u64,
    pub frames_failed: u64,
    pub rows_written: u64,
    pub row_errors: u64,
    pub alerts: u64,
}

impl RunCounters {
    pub fn success_rate(&self) -> f64 {
        let attempted = self.frames_ok + self.frames_failed;
        if attempted == 0 {
            0.0
        } else {
            self.frames_ok as f64 * 100.0 / attempted as f64
        }
    }

    pub fn is_clean(&self) -> bool {
        self.frames_failed == 0 && self.row_errors == 0
    }
}

/// How the background tasks ended during shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub counters: RunCounters,
    pub vitals_joined: bool,
    pub location_joined: bool,
    pub telemetry_closed: bool,
}
