use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::alert::AlertDispatcher;
use crate::config::SamplingConfig;
use crate::detection::{FallClassifier, FeatureExtractor, Transition};
use crate::gps::LocationProvider;
use crate::sensors::{MotionSource, VitalsSource};
use crate::telemetry::{TelemetryLog, TelemetryRow};
use crate::types::{FallState, RunCounters, ShutdownReport};
use crate::utils::Throttle;

/// Everything the sampling loop drives, built once at startup.
pub struct PipelineParts {
    pub motion: Box<dyn MotionSource>,
    pub vitals: Arc<dyn VitalsSource>,
    pub location: Arc<dyn LocationProvider>,
    pub classifier: FallClassifier,
    pub dispatcher: AlertDispatcher,
    pub telemetry: TelemetryLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No frame could be read; nothing was recorded.
    Skipped,
    Recorded { alert: bool },
}

pub struct SamplingOrchestrator {
    parts: PipelineParts,
    extractor: FeatureExtractor,
    config: SamplingConfig,
    counters: RunCounters,
    read_failures: Throttle,
    row_failures: Throttle,
    last_status: Option<Instant>,
}

impl SamplingOrchestrator {
    pub fn new(parts: PipelineParts, config: SamplingConfig) -> Self {
        let every = config.failure_log_every;
        Self {
            parts,
            extractor: FeatureExtractor::default(),
            config,
            counters: RunCounters::default(),
            read_failures: Throttle::new(every),
            row_failures: Throttle::new(every),
            last_status: None,
        }
    }

    /// One sampling cycle: read, extract, classify, maybe alert, record.
    pub fn run_cycle(&mut self, now: Instant) -> CycleOutcome {
        self.counters.cycles += 1;

        let frame = match self.parts.motion.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.frames_failed += 1;
                if let Some(count) = self.read_failures.hit() {
                    warn!(
                        "IMU read failed [{:?}], skipping cycle ({} failures so far): {}",
                        e.fault_kind(),
                        count,
                        e
                    );
                }
                return CycleOutcome::Skipped;
            }
        };
        self.counters.frames_ok += 1;

        let vitals = self.parts.vitals.latest();
        let features = self.extractor.extract(&frame);
        let (classification, transition) = self.parts.classifier.process(features, now);

        let alert = transition == Transition::Triggered;
        if alert {
            let state = self.parts.classifier.state();
            self.parts
                .dispatcher
                .dispatch(&classification, &vitals, &frame, &state);
            self.counters.alerts += 1;
        }

        let row = TelemetryRow::from_cycle(&frame, &vitals, &classification, alert);
        match self.parts.telemetry.append(&row) {
            Ok(()) => self.counters.rows_written += 1,
            Err(e) => {
                self.counters.row_errors += 1;
                if let Some(count) = self.row_failures.hit() {
                    error!("Telemetry write failed ({} so far): {}", count, e);
                }
            }
        }

        self.maybe_log_status(now, &row);
        CycleOutcome::Recorded { alert }
    }

    fn maybe_log_status(&mut self, now: Instant, row: &TelemetryRow) {
        let due = match self.last_status {
            Some(last) => now.saturating_duration_since(last) >= self.config.status_interval(),
            None => true,
        };
        if !due {
            return;
        }
        self.last_status = Some(now);

        let hr = if row.finger_detected {
            format!("{:.0}", row.bpm)
        } else {
            "--".to_string()
        };
        let spo2 = row
            .spo2
            .map(|v| format!("{:.0}%", v))
            .unwrap_or_else(|| "--".to_string());
        let location = self.parts.location.latest_snapshot();
        info!(
            "Accel {:.2}g | Gyro {:.1}°/s | HR {} | SpO2 {} | Fall {} ({:.2}) | GPS {} | Falls {}",
            row.accel_magnitude,
            row.gyro_magnitude,
            hr,
            spo2,
            if row.fall_predicted { "YES" } else { "no" },
            row.fall_confidence,
            location.status.as_str(),
            self.parts.classifier.state().fall_count,
        );
    }

    /// Run cycles at the configured cadence until `stop` is set, then shut down.
    pub fn run(mut self, stop: Arc<AtomicBool>) -> ShutdownReport {
        let interval = self.config.interval();
        info!(
            "Sampling at {:.1} Hz ({} ms per cycle)",
            self.config.rate_hz,
            interval.as_millis()
        );

        let mut next = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            self.run_cycle(Instant::now());

            next += interval;
            let now = Instant::now();
            if next > now {
                sleep_until(next, &stop);
            } else {
                // Overrun: start the next cycle right away.
                next = now;
            }
        }

        info!("Shutdown requested, stopping sampling loop");
        self.shutdown()
    }

    /// Stop background tasks, close the telemetry log and report counters.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let timeout = self.config.join_timeout();

        let vitals_joined = self.parts.vitals.shutdown(timeout);
        if !vitals_joined {
            warn!("Vitals task did not stop within {:?}, abandoning it", timeout);
        }
        let location_joined = self.parts.location.shutdown(timeout);
        if !location_joined {
            warn!("Location task did not stop within {:?}, abandoning it", timeout);
        }

        let telemetry_closed = match self.parts.telemetry.close() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to close telemetry log: {}", e);
                false
            }
        };

        let c = self.counters;
        info!(
            "Session finished: {} cycles, {} frames ok, {} failed ({:.1}% success), {} rows, {} row errors, {} alerts ({} channel failures)",
            c.cycles,
            c.frames_ok,
            c.frames_failed,
            c.success_rate(),
            c.rows_written,
            c.row_errors,
            c.alerts,
            self.parts.dispatcher.channel_failures()
        );

        ShutdownReport {
            counters: c,
            vitals_joined,
            location_joined,
            telemetry_closed,
        }
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn fall_state(&self) -> FallState {
        self.parts.classifier.state()
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.parts.telemetry.path().to_path_buf()
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.parts.dispatcher
    }
}

/// Sleep in short slices so a stop request is noticed quickly.
fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(20);
    loop {
        let now = Instant::now();
        if now >= deadline || stop.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep((deadline - now).min(SLICE));
    }
}
