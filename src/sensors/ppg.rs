//! Heart rate and SpO2 estimation from a MAX30102-style red/IR sample stream.
//!
//! The estimator keeps a fixed sliding window of raw sample pairs. Once the
//! window is full every new batch of samples triggers one estimate:
//!
//! ```text
//! HR   = 60 * fs / mean(peak-to-peak interval of the inverted, smoothed IR signal)
//! R    = (AC_red / DC_red) / (AC_ir / DC_ir)
//! SpO2 = -45.060 * R^2 + 30.354 * R + 94.845
//! ```
//!
//! The published heart rate is the mean of the last few valid estimates. A
//! window whose mean intensity is below the contact threshold on both channels
//! is reported as "no finger".

use std::collections::VecDeque;

use crate::error::SensorError;
use crate::types::VitalsSnapshot;

/// One FIFO entry from the optical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpgSample {
    pub red: u32,
    pub ir: u32,
}

/// Raw optical sample stream.
pub trait PpgSource: Send {
    fn init(&mut self) -> Result<(), SensorError>;

    /// Append every sample currently buffered by the sensor to `out`.
    fn drain(&mut self, out: &mut Vec<PpgSample>) -> Result<usize, SensorError>;

    fn shutdown(&mut self) {}
}

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 220.0;
const SMOOTHING_TAPS: usize = 4;

/// One un-smoothed estimate from a full window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowEstimate {
    pub bpm: Option<f64>,
    pub spo2: Option<f64>,
}

pub fn estimate_window(red: &[f64], ir: &[f64], sample_rate_hz: f64) -> WindowEstimate {
    WindowEstimate {
        bpm: heart_rate(ir, sample_rate_hz),
        spo2: oxygen_saturation(red, ir),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn moving_average(values: &[f64], taps: usize) -> Vec<f64> {
    if values.len() < taps {
        return Vec::new();
    }
    values
        .windows(taps)
        .map(|w| w.iter().sum::<f64>() / taps as f64)
        .collect()
}

/// Beats show up as valleys in the IR signal; invert, remove DC, smooth, and
/// look for peaks above a threshold with a minimum spacing.
fn heart_rate(ir: &[f64], sample_rate_hz: f64) -> Option<f64> {
    if ir.len() < SMOOTHING_TAPS * 2 || sample_rate_hz <= 0.0 {
        return None;
    }

    let dc = mean(ir);
    let inverted: Vec<f64> = ir.iter().map(|x| dc - x).collect();
    let smooth = moving_average(&inverted, SMOOTHING_TAPS);

    let max = smooth.iter().cloned().fold(f64::MIN, f64::max);
    if max <= 0.0 {
        return None;
    }
    let threshold = max * 0.3;
    // Closest two beats may be: 60 / MAX_BPM seconds.
    let min_distance = ((sample_rate_hz * 60.0 / MAX_BPM).floor() as usize).max(1);

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..smooth.len() - 1 {
        let is_peak = smooth[i] > threshold && smooth[i] > smooth[i - 1] && smooth[i] >= smooth[i + 1];
        if !is_peak {
            continue;
        }
        match peaks.last() {
            Some(&prev) if i - prev < min_distance => {
                if smooth[i] > smooth[prev] {
                    peaks.pop();
                    peaks.push(i);
                }
            }
            _ => peaks.push(i),
        }
    }

    if peaks.len() < 2 {
        return None;
    }

    let intervals: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let bpm = 60.0 * sample_rate_hz / mean(&intervals);
    (MIN_BPM..=MAX_BPM).contains(&bpm).then_some(bpm)
}

/// AC as half the peak-to-peak swing, DC as the mean.
fn ac_dc(signal: &[f64]) -> Option<(f64, f64)> {
    let dc = mean(signal);
    let max = signal.iter().cloned().fold(f64::MIN, f64::max);
    let min = signal.iter().cloned().fold(f64::MAX, f64::min);
    let ac = (max - min) / 2.0;
    (dc > 0.0 && ac > 0.0).then_some((ac, dc))
}

fn oxygen_saturation(red: &[f64], ir: &[f64]) -> Option<f64> {
    let (red_ac, red_dc) = ac_dc(red)?;
    let (ir_ac, ir_dc) = ac_dc(ir)?;
    let r = (red_ac / red_dc) / (ir_ac / ir_dc);
    if !r.is_finite() || r <= 0.0 {
        return None;
    }
    let spo2 = -45.060 * r * r + 30.354 * r + 94.845;
    if spo2 < 70.0 {
        return None;
    }
    Some(spo2.min(100.0))
}

/// Sliding-window vitals state machine fed by the background task.
#[derive(Debug, Clone)]
pub struct VitalsEstimator {
    red: VecDeque<f64>,
    ir: VecDeque<f64>,
    window_size: usize,
    sample_rate_hz: f64,
    finger_threshold: f64,
    recent_bpm: VecDeque<f64>,
    smoothing: usize,
    bpm: f64,
    spo2: Option<f64>,
}

impl VitalsEstimator {
    pub fn new(window_size: usize, smoothing: usize, sample_rate_hz: f64, finger_threshold: f64) -> Self {
        Self {
            red: VecDeque::with_capacity(window_size),
            ir: VecDeque::with_capacity(window_size),
            window_size: window_size.max(2),
            sample_rate_hz,
            finger_threshold,
            recent_bpm: VecDeque::with_capacity(smoothing),
            smoothing: smoothing.max(1),
            bpm: 0.0,
            spo2: None,
        }
    }

    pub fn push(&mut self, sample: PpgSample) {
        if self.red.len() == self.window_size {
            self.red.pop_front();
            self.ir.pop_front();
        }
        self.red.push_back(sample.red as f64);
        self.ir.push_back(sample.ir as f64);
    }

    pub fn is_window_full(&self) -> bool {
        self.red.len() == self.window_size
    }

    /// Recompute from the current window. Returns `None` until the window is full.
    pub fn evaluate(&mut self) -> Option<VitalsSnapshot> {
        if !self.is_window_full() {
            return None;
        }

        let red: Vec<f64> = self.red.iter().copied().collect();
        let ir: Vec<f64> = self.ir.iter().copied().collect();

        if mean(&ir) < self.finger_threshold && mean(&red) < self.finger_threshold {
            self.bpm = 0.0;
            self.spo2 = None;
            self.recent_bpm.clear();
            return Some(self.snapshot());
        }

        let estimate = estimate_window(&red, &ir, self.sample_rate_hz);
        if let Some(bpm) = estimate.bpm {
            if self.recent_bpm.len() == self.smoothing {
                self.recent_bpm.pop_front();
            }
            self.recent_bpm.push_back(bpm);
            self.bpm = self.recent_bpm.iter().sum::<f64>() / self.recent_bpm.len() as f64;

            if let Some(spo2) = estimate.spo2.filter(|v| *v > 0.0) {
                self.spo2 = Some(spo2);
            }
        }

        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> VitalsSnapshot {
        VitalsSnapshot::new(self.bpm, self.spo2)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Red/IR pair with a raised-cosine dip per beat, like a finger on the sensor.
    pub(crate) fn synthetic_ppg(bpm: f64, sample_rate_hz: f64, count: usize, dc: f64) -> Vec<PpgSample> {
        let beat_hz = bpm / 60.0;
        (0..count)
            .map(|n| {
                let t = n as f64 / sample_rate_hz;
                let pulse = (2.0 * PI * beat_hz * t).cos();
                PpgSample {
                    red: (dc * 0.9 + 600.0 * pulse) as u32,
                    ir: (dc + 1200.0 * pulse) as u32,
                }
            })
            .collect()
    }

    #[test]
    fn heart_rate_matches_synthetic_pulse() {
        let samples = synthetic_ppg(75.0, 25.0, 100, 100_000.0);
        let ir: Vec<f64> = samples.iter().map(|s| s.ir as f64).collect();
        let bpm = heart_rate(&ir, 25.0).unwrap();
        assert!((bpm - 75.0).abs() < 8.0, "bpm = {}", bpm);
    }

    #[test]
    fn flat_signal_has_no_heart_rate() {
        let ir = vec![80_000.0; 100];
        assert_eq!(heart_rate(&ir, 25.0), None);
    }

    #[test]
    fn spo2_stays_in_physiological_range() {
        let samples = synthetic_ppg(70.0, 25.0, 100, 100_000.0);
        let red: Vec<f64> = samples.iter().map(|s| s.red as f64).collect();
        let ir: Vec<f64> = samples.iter().map(|s| s.ir as f64).collect();
        let spo2 = oxygen_saturation(&red, &ir).unwrap();
        assert!((70.0..=100.0).contains(&spo2), "spo2 = {}", spo2);
    }

    #[test]
    fn nothing_published_until_window_full() {
        let mut estimator = VitalsEstimator::new(100, 4, 25.0, 50_000.0);
        for sample in synthetic_ppg(72.0, 25.0, 99, 100_000.0) {
            estimator.push(sample);
        }
        assert_eq!(estimator.evaluate(), None);
    }

    #[test]
    fn smoothed_rate_published_with_finger_present() {
        let mut estimator = VitalsEstimator::new(100, 4, 25.0, 50_000.0);
        let mut last = None;
        for chunk in synthetic_ppg(72.0, 25.0, 200, 100_000.0).chunks(10) {
            for sample in chunk {
                estimator.push(*sample);
            }
            if let Some(snapshot) = estimator.evaluate() {
                last = Some(snapshot);
            }
        }
        let snapshot = last.unwrap();
        assert!(snapshot.finger_detected);
        assert!((snapshot.heart_rate_bpm - 72.0).abs() < 8.0);
        assert!(snapshot.spo2.is_some());
    }

    #[test]
    fn low_intensity_means_no_finger() {
        let mut estimator = VitalsEstimator::new(100, 4, 25.0, 50_000.0);
        for sample in synthetic_ppg(72.0, 25.0, 100, 100_000.0) {
            estimator.push(sample);
        }
        assert!(estimator.evaluate().unwrap().finger_detected);

        for sample in synthetic_ppg(72.0, 25.0, 100, 5_000.0) {
            estimator.push(sample);
        }
        let snapshot = estimator.evaluate().unwrap();
        assert_eq!(snapshot, VitalsSnapshot::no_contact());
        assert_eq!(snapshot.heart_rate_bpm, 0.0);
        assert!(!snapshot.finger_detected);
    }
}
