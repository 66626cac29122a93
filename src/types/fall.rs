use std::time::Instant;

use super::FeatureVector;

/// Safe/Alerting state of the fall detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FallState {
    pub is_fall_active: bool,
    pub fall_count: u32,
    pub last_trigger_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub is_fall: bool,
    pub confidence: f64,
    pub features: FeatureVector,
}

impl ClassificationResult {
    /// Result used whenever the scorer cannot produce one.
    pub fn safe(features: FeatureVector) -> Self {
        Self {
            is_fall: false,
            confidence: 0.0,
            features,
        }
    }
}
