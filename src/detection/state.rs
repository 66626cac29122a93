use std::time::{Duration, Instant};

use crate::types::{ClassificationResult, FallState};

/// What one classification did to the fall state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Safe -> Alerting. The caller dispatches an alert this cycle.
    Triggered,
    /// Qualifying fall while already alerting; no new alert.
    Suppressed,
    /// Refractory window expired, back to Safe.
    Cleared,
    Quiet,
}

/// Two-state (Safe / Alerting) fall detector with a refractory window.
///
/// Time is injected so transitions can be tested without sleeping.
#[derive(Debug, Clone)]
pub struct FallStateMachine {
    state: FallState,
    confidence_threshold: f64,
    refractory: Duration,
}

impl FallStateMachine {
    pub fn new(confidence_threshold: f64, refractory: Duration) -> Self {
        Self {
            state: FallState::default(),
            confidence_threshold,
            refractory,
        }
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    pub fn is_alerting(&self) -> bool {
        self.state.is_fall_active
    }

    /// Expiry is checked before the new result, so a fall seen in the same
    /// cycle the window closes starts a new alert.
    pub fn update(&mut self, result: &ClassificationResult, now: Instant) -> Transition {
        let mut cleared = false;
        if self.state.is_fall_active {
            let expired = match self.state.last_trigger_at {
                Some(at) => now.saturating_duration_since(at) > self.refractory,
                None => true,
            };
            if expired {
                self.state.is_fall_active = false;
                cleared = true;
            }
        }

        let qualifies = result.is_fall && result.confidence > self.confidence_threshold;
        if qualifies {
            if self.state.is_fall_active {
                return Transition::Suppressed;
            }
            self.state.is_fall_active = true;
            self.state.fall_count += 1;
            self.state.last_trigger_at = Some(now);
            return Transition::Triggered;
        }

        if cleared {
            Transition::Cleared
        } else {
            Transition::Quiet
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureVector;

    fn result(is_fall: bool, confidence: f64) -> ClassificationResult {
        ClassificationResult {
            is_fall,
            confidence,
            features: FeatureVector::default(),
        }
    }

    fn machine() -> FallStateMachine {
        FallStateMachine::new(0.8, Duration::from_secs(3))
    }

    #[test]
    fn confident_fall_triggers_once() {
        let mut m = machine();
        let t0 = Instant::now();
        assert_eq!(m.update(&result(true, 0.95), t0), Transition::Triggered);
        assert_eq!(m.state().fall_count, 1);
        assert_eq!(m.state().last_trigger_at, Some(t0));

        for ms in (100..=3000).step_by(100) {
            let now = t0 + Duration::from_millis(ms);
            assert_eq!(m.update(&result(true, 0.95), now), Transition::Suppressed);
        }
        assert_eq!(m.state().fall_count, 1);
    }

    #[test]
    fn threshold_is_strict() {
        let mut m = machine();
        let now = Instant::now();
        assert_eq!(m.update(&result(true, 0.8), now), Transition::Quiet);
        assert_eq!(m.update(&result(false, 0.99), now), Transition::Quiet);
        assert!(!m.is_alerting());
        assert_eq!(m.state().fall_count, 0);
    }

    #[test]
    fn clears_after_refractory_regardless_of_output() {
        let mut m = machine();
        let t0 = Instant::now();
        m.update(&result(true, 0.9), t0);

        assert_eq!(
            m.update(&result(false, 0.99), t0 + Duration::from_secs(3)),
            Transition::Quiet
        );
        assert!(m.is_alerting());
        assert_eq!(
            m.update(&result(false, 0.99), t0 + Duration::from_millis(3001)),
            Transition::Cleared
        );
        assert!(!m.is_alerting());
    }

    #[test]
    fn continuous_fall_retriggers_once_per_window() {
        let mut m = machine();
        let t0 = Instant::now();
        let mut triggers = Vec::new();
        // 10 Hz for 10 seconds.
        for tick in 0..100u64 {
            let now = t0 + Duration::from_millis(tick * 100);
            if m.update(&result(true, 0.95), now) == Transition::Triggered {
                triggers.push(tick);
            }
        }
        assert_eq!(triggers, vec![0, 31, 62, 93]);
        assert_eq!(m.state().fall_count, 4);
    }
}
