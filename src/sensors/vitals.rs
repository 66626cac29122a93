use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use super::ppg::{PpgSample, PpgSource, VitalsEstimator};
use crate::config::VitalsConfig;
use crate::error::SensorError;
use crate::types::VitalsSnapshot;
use crate::utils::{join_with_timeout, Throttle};

/// Latest vital signs, whoever produces them.
pub trait VitalsSource: Send + Sync {
    fn latest(&self) -> VitalsSnapshot;

    /// Stop any background work. Returns `false` if it did not stop in time.
    fn shutdown(&self, timeout: Duration) -> bool;
}

/// Stand-in used when the PPG sensor is missing: always "no contact".
#[derive(Debug, Default)]
pub struct DisabledVitals;

impl VitalsSource for DisabledVitals {
    fn latest(&self) -> VitalsSnapshot {
        VitalsSnapshot::no_contact()
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Owns the PPG polling thread. Only that thread writes the snapshot.
pub struct VitalsReader {
    snapshot: Arc<RwLock<VitalsSnapshot>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VitalsReader {
    /// Initialise `source` and start polling it. Initialisation failure is
    /// returned so the caller can fall back to [`DisabledVitals`].
    pub fn spawn<S>(mut source: S, config: &VitalsConfig, failure_log_every: u64) -> Result<Self, SensorError>
    where
        S: PpgSource + 'static,
    {
        source.init()?;

        let snapshot = Arc::new(RwLock::new(VitalsSnapshot::no_contact()));
        let stop = Arc::new(AtomicBool::new(false));
        let estimator = VitalsEstimator::new(
            config.window_size,
            config.smoothing,
            config.sample_rate_hz,
            config.finger_threshold,
        );
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let worker_snapshot = Arc::clone(&snapshot);
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("vitals".into())
            .spawn(move || {
                run_vitals_loop(
                    source,
                    estimator,
                    worker_snapshot,
                    worker_stop,
                    poll_interval,
                    Throttle::new(failure_log_every),
                )
            })
            .map_err(|e| SensorError::unavailable("ppg", format!("cannot spawn worker: {}", e)))?;

        Ok(Self {
            snapshot,
            stop,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl VitalsSource for VitalsReader {
    fn latest(&self) -> VitalsSnapshot {
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => join_with_timeout(handle, timeout),
            None => true,
        }
    }
}

impl Drop for VitalsReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_vitals_loop<S: PpgSource>(
    mut source: S,
    mut estimator: VitalsEstimator,
    snapshot: Arc<RwLock<VitalsSnapshot>>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    mut failures: Throttle,
) {
    info!("Vitals task started");
    let mut batch: Vec<PpgSample> = Vec::with_capacity(32);

    while !stop.load(Ordering::Relaxed) {
        batch.clear();
        match source.drain(&mut batch) {
            Ok(0) => {}
            Ok(_) => {
                for sample in &batch {
                    estimator.push(*sample);
                }
                if let Some(latest) = estimator.evaluate() {
                    *snapshot.write().unwrap_or_else(PoisonError::into_inner) = latest;
                }
            }
            Err(e) => {
                if let Some(count) = failures.hit() {
                    warn!("PPG read failed [{:?}] ({} so far): {}", e.fault_kind(), count, e);
                }
            }
        }
        thread::sleep(poll_interval);
    }

    source.shutdown();
    *snapshot.write().unwrap_or_else(PoisonError::into_inner) = VitalsSnapshot::no_contact();
    info!("Vitals task exiting gracefully");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ppg::tests::synthetic_ppg;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Hands out pre-generated batches, then nothing.
    struct ReplaySource {
        batches: VecDeque<Vec<PpgSample>>,
        fail_init: bool,
    }

    impl PpgSource for ReplaySource {
        fn init(&mut self) -> Result<(), SensorError> {
            if self.fail_init {
                Err(SensorError::unavailable("ppg", "no device on bus"))
            } else {
                Ok(())
            }
        }

        fn drain(&mut self, out: &mut Vec<PpgSample>) -> Result<usize, SensorError> {
            match self.batches.pop_front() {
                Some(batch) => {
                    let n = batch.len();
                    out.extend(batch);
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    fn config() -> VitalsConfig {
        VitalsConfig {
            poll_interval_ms: 1,
            ..VitalsConfig::default()
        }
    }

    fn wait_for(reader: &VitalsReader, pred: impl Fn(&VitalsSnapshot) -> bool) -> VitalsSnapshot {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let snapshot = reader.latest();
            if pred(&snapshot) || Instant::now() > deadline {
                return snapshot;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn publishes_heart_rate_once_window_fills() {
        let samples = synthetic_ppg(80.0, 25.0, 150, 100_000.0);
        let source = ReplaySource {
            batches: samples.chunks(25).map(|c| c.to_vec()).collect(),
            fail_init: false,
        };

        let reader = VitalsReader::spawn(source, &config(), 10).unwrap();
        let snapshot = wait_for(&reader, |s| s.finger_detected);
        assert!(snapshot.finger_detected);
        assert!((snapshot.heart_rate_bpm - 80.0).abs() < 10.0);
        assert!(reader.shutdown(Duration::from_secs(2)));
        assert_eq!(reader.latest(), VitalsSnapshot::no_contact());
    }

    #[test]
    fn init_failure_is_reported() {
        let source = ReplaySource {
            batches: VecDeque::new(),
            fail_init: true,
        };
        let err = VitalsReader::spawn(source, &config(), 10).err().unwrap();
        assert_eq!(err.fault_kind(), crate::error::FaultKind::SensorUnavailable);
    }

    #[test]
    fn disabled_variant_reports_no_contact() {
        let vitals = DisabledVitals;
        assert_eq!(vitals.latest(), VitalsSnapshot::no_contact());
        assert!(vitals.shutdown(Duration::ZERO));
    }
}
