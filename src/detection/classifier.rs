use std::time::Instant;

use log::warn;

use super::scorer::FallScorer;
use super::state::{FallStateMachine, Transition};
use crate::config::ClassifierConfig;
use crate::error::ScoreError;
use crate::types::{ClassificationResult, FallState, FeatureVector};
use crate::utils::Throttle;

/// Wraps a scorer so that any scoring failure reads as "no fall", and owns
/// the fall state machine.
pub struct FallClassifier {
    scorer: Box<dyn FallScorer>,
    machine: FallStateMachine,
    unavailable_reported: bool,
    failures: Throttle,
}

impl FallClassifier {
    pub fn new(scorer: Box<dyn FallScorer>, config: &ClassifierConfig, failure_log_every: u64) -> Self {
        Self {
            scorer,
            machine: FallStateMachine::new(config.confidence_threshold, config.refractory()),
            unavailable_reported: false,
            failures: Throttle::new(failure_log_every),
        }
    }

    pub fn classify(&mut self, features: FeatureVector) -> ClassificationResult {
        match self.scorer.predict(&features) {
            Ok(prediction) => ClassificationResult {
                is_fall: prediction.is_fall,
                confidence: prediction.confidence,
                features,
            },
            Err(e) => {
                self.report(&e);
                ClassificationResult::safe(features)
            }
        }
    }

    /// Classify and advance the state machine in one step.
    pub fn process(&mut self, features: FeatureVector, now: Instant) -> (ClassificationResult, Transition) {
        let result = self.classify(features);
        let transition = self.machine.update(&result, now);
        (result, transition)
    }

    pub fn state(&self) -> FallState {
        self.machine.state()
    }

    fn report(&mut self, error: &ScoreError) {
        match error {
            ScoreError::Unavailable(_) => {
                if !self.unavailable_reported {
                    warn!("Fall detection unavailable, treating every frame as safe: {}", error);
                    self.unavailable_reported = true;
                }
            }
            _ => {
                if let Some(count) = self.failures.hit() {
                    warn!("Fall scoring failed [{:?}] ({} so far): {}", error.fault_kind(), count, error);
                }
            }
        }
    }
}
