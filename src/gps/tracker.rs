use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::nmea::{parse_sentence, Sentence};
use crate::error::{NmeaError, SensorError};
use crate::types::{GpsStatus, LocationSnapshot};
use crate::utils::{now_millis, Throttle};

/// Last known position, whoever produces it.
pub trait LocationProvider: Send + Sync {
    /// Copy of the current state. Repeated calls without new input are equal.
    fn latest_snapshot(&self) -> LocationSnapshot;

    fn is_valid(&self) -> bool {
        self.latest_snapshot().is_valid()
    }

    /// Stop any background work. Returns `false` if it did not stop in time.
    fn shutdown(&self, timeout: Duration) -> bool;
}

/// Used when no positioning feed could be opened.
#[derive(Debug, Default)]
pub struct DisabledLocation;

impl LocationProvider for DisabledLocation {
    fn latest_snapshot(&self) -> LocationSnapshot {
        LocationSnapshot::default()
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Apply one decoded sentence. Only GGA moves the fix status.
pub fn apply_sentence(snapshot: &mut LocationSnapshot, sentence: Sentence) {
    match sentence {
        Sentence::Gga(fix) => {
            snapshot.latitude = fix.latitude;
            snapshot.longitude = fix.longitude;
            snapshot.altitude = fix.altitude;
            snapshot.fix_quality = fix.fix_quality;
            snapshot.satellites = fix.satellites;
            snapshot.observed_at = Some(now_millis());
            snapshot.status = if fix.fix_quality > 0 {
                GpsStatus::Fixed
            } else {
                GpsStatus::Searching
            };
        }
        Sentence::Rmc(course) => {
            if course.speed_kmh.is_some() {
                snapshot.speed_kmh = course.speed_kmh;
            }
            if course.course_deg.is_some() {
                snapshot.course_deg = course.course_deg;
            }
        }
    }
}

/// Parse `line` and fold it into `state`. Returns whether the snapshot changed.
/// A malformed line leaves the state untouched.
pub fn ingest_line(state: &RwLock<LocationSnapshot>, line: &str) -> Result<bool, NmeaError> {
    match parse_sentence(line)? {
        Some(sentence) => {
            let mut snapshot = state.write().unwrap_or_else(PoisonError::into_inner);
            apply_sentence(&mut snapshot, sentence);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Background GNSS reader. The worker thread is the only writer of the snapshot.
pub struct LocationTracker {
    snapshot: Arc<RwLock<LocationSnapshot>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocationTracker {
    pub fn spawn<R>(feed: R, failure_log_every: u64) -> Result<Self, SensorError>
    where
        R: BufRead + Send + 'static,
    {
        let snapshot = Arc::new(RwLock::new(LocationSnapshot::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_snapshot = Arc::clone(&snapshot);
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("location".into())
            .spawn(move || run_location_loop(feed, worker_snapshot, worker_stop, failure_log_every))
            .map_err(|e| SensorError::unavailable("gnss", format!("cannot spawn worker: {}", e)))?;

        Ok(Self {
            snapshot,
            stop,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl LocationProvider for LocationTracker {
    fn latest_snapshot(&self) -> LocationSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => crate::utils::join_with_timeout(handle, timeout),
            None => true,
        }
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_location_loop<R: BufRead>(
    mut feed: R,
    snapshot: Arc<RwLock<LocationSnapshot>>,
    stop: Arc<AtomicBool>,
    failure_log_every: u64,
) {
    info!("Location task started");
    let mut malformed = Throttle::new(failure_log_every);
    let mut read_errors = Throttle::new(failure_log_every);
    let mut buf: Vec<u8> = Vec::with_capacity(128);

    while !stop.load(Ordering::Relaxed) {
        buf.clear();
        match feed.read_until(b'\n', &mut buf) {
            Ok(0) => {
                info!("Positioning feed ended, keeping last known location");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Err(e) = ingest_line(&snapshot, &line) {
                    if let Some(count) = malformed.hit() {
                        debug!("Discarded NMEA sentence [{:?}] ({} so far): {}", e.fault_kind(), count, e);
                    }
                }
            }
            // Serial reads time out while the receiver is quiet.
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                if let Some(count) = read_errors.hit() {
                    warn!("Positioning feed read error ({} so far): {}", count, e);
                }
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    info!("Location task exiting gracefully");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::nmea::with_checksum;
    use std::io::Cursor;
    use std::time::Instant;

    const FIX: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    fn no_fix() -> String {
        with_checksum("$GPGGA,123520,,,,,0,00,,,M,,M,,")
    }

    #[test]
    fn status_moves_only_through_gga() {
        let state = RwLock::new(LocationSnapshot::default());
        assert_eq!(state.read().unwrap().status, GpsStatus::Initializing);

        let rmc = with_checksum("$GPRMC,123519,A,4807.038,N,01131.000,E,010.0,090.0,230394,,");
        assert!(ingest_line(&state, &rmc).unwrap());
        assert_eq!(state.read().unwrap().status, GpsStatus::Initializing);
        assert!((state.read().unwrap().speed_kmh.unwrap() - 18.52).abs() < 1e-9);

        ingest_line(&state, &no_fix()).unwrap();
        assert_eq!(state.read().unwrap().status, GpsStatus::Searching);
        assert!(!state.read().unwrap().is_valid());

        ingest_line(&state, FIX).unwrap();
        let snapshot = state.read().unwrap().clone();
        assert_eq!(snapshot.status, GpsStatus::Fixed);
        assert!(snapshot.is_valid());
        assert_eq!(snapshot.satellites, 8);
        assert!(snapshot.observed_at.is_some());

        ingest_line(&state, &no_fix()).unwrap();
        assert_eq!(state.read().unwrap().status, GpsStatus::Searching);
    }

    #[test]
    fn malformed_sentence_keeps_last_good_state() {
        let state = RwLock::new(LocationSnapshot::default());
        ingest_line(&state, FIX).unwrap();
        let before = state.read().unwrap().clone();

        for bad in [
            FIX.replace("*47", "*00"),
            with_checksum("$GPGGA,1,4807.038,X,01131.000,E,1,08,0.9,545.4,M,,M,,"),
            with_checksum("$GPGGA,1,2,3"),
            "garbage".to_string(),
        ] {
            assert!(ingest_line(&state, &bad).is_err());
        }
        assert_eq!(*state.read().unwrap(), before);
    }

    #[test]
    fn tracker_reads_feed_and_snapshot_is_idempotent() {
        let feed = format!("{}\r\nnot nmea\n{}\n", no_fix(), FIX);
        let tracker = LocationTracker::spawn(Cursor::new(feed.into_bytes()), 10).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !tracker.is_valid() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let first = tracker.latest_snapshot();
        let second = tracker.latest_snapshot();
        assert!(first.is_valid());
        assert_eq!(first, second);
        assert_eq!(first.describe(), "Lat: 48.117300, Lon: 11.516667");
        assert!(tracker.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn disabled_location_is_never_valid() {
        let location = DisabledLocation;
        assert!(!location.is_valid());
        assert_eq!(location.latest_snapshot().status, GpsStatus::Initializing);
        assert_eq!(location.latest_snapshot().maps_link(), None);
    }
}
