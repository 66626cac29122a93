use std::collections::VecDeque;

use crate::types::{FeatureVector, MotionFrame};

pub const HISTORY_CAPACITY: usize = 10;

/// Keeps the last few frames and derives per-frame features from the newest
/// frame and its predecessor.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    history: VecDeque<MotionFrame>,
    capacity: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl FeatureExtractor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Features for `frame`, then `frame` joins the history.
    pub fn extract(&mut self, frame: &MotionFrame) -> FeatureVector {
        let accel_magnitude = frame.accel_magnitude();
        let gyro_magnitude = frame.gyro_magnitude();

        let (accel_delta, gyro_delta) = match self.history.back() {
            Some(prev) => (
                accel_magnitude - prev.accel_magnitude(),
                gyro_magnitude - prev.gyro_magnitude(),
            ),
            None => (0.0, 0.0),
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(*frame);

        FeatureVector {
            accel_magnitude,
            gyro_magnitude,
            accel_delta,
            gyro_delta,
            vertical_deviation: (frame.az - 1.0).abs(),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_millis;

    fn frame(accel: [f64; 3], gyro: [f64; 3]) -> MotionFrame {
        MotionFrame::new(accel, gyro, 30.0, now_millis())
    }

    #[test]
    fn first_frame_has_zero_deltas() {
        let mut extractor = FeatureExtractor::default();
        let features = extractor.extract(&frame([0.0, 0.0, 1.0], [0.0; 3]));
        assert_eq!(features.accel_magnitude, 1.0);
        assert_eq!(features.gyro_magnitude, 0.0);
        assert_eq!(features.accel_delta, 0.0);
        assert_eq!(features.gyro_delta, 0.0);
        assert_eq!(features.vertical_deviation, 0.0);
    }

    #[test]
    fn deltas_are_against_the_previous_frame() {
        let mut extractor = FeatureExtractor::default();
        extractor.extract(&frame([0.0, 0.0, 1.0], [0.0; 3]));
        let features = extractor.extract(&frame([0.0, 0.0, -2.0], [3.0, 4.0, 0.0]));
        assert_eq!(features.accel_magnitude, 2.0);
        assert_eq!(features.accel_delta, 1.0);
        assert_eq!(features.gyro_delta, 5.0);
        assert_eq!(features.vertical_deviation, 3.0);

        let features = extractor.extract(&frame([0.0, 0.0, 0.5], [0.0; 3]));
        assert_eq!(features.accel_delta, -1.5);
        assert_eq!(features.gyro_delta, -5.0);
    }

    #[test]
    fn magnitudes_never_negative() {
        let mut extractor = FeatureExtractor::default();
        for i in 0..50 {
            let v = (i as f64 - 25.0) / 7.0;
            let features = extractor.extract(&frame([v, -v, v * 0.5], [-v * 30.0, v, -v]));
            assert!(features.accel_magnitude >= 0.0);
            assert!(features.gyro_magnitude >= 0.0);
            assert!(features.vertical_deviation >= 0.0);
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut extractor = FeatureExtractor::default();
        for _ in 0..25 {
            extractor.extract(&frame([0.0, 0.0, 1.0], [0.0; 3]));
        }
        assert_eq!(extractor.len(), HISTORY_CAPACITY);
    }
}
