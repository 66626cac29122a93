//! Fall scoring backends.
//!
//! The trained classifier ships as a JSON tree ensemble:
//!
//! ```json
//! {
//!   "feature_names": ["accel_magnitude", "gyro_magnitude", "accel_delta", "gyro_delta", "vertical_deviation"],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 0, "threshold": 1.8, "left": 1, "right": 2 },
//!         { "value": [0.97, 0.03] },
//!         { "value": [0.05, 0.95] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Split nodes send a sample left when `x[feature] <= threshold`. Leaf values
//! are `[p_safe, p_fall]`; the ensemble averages them over all trees.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info};
use serde::Deserialize;

use crate::error::ScoreError;
use crate::types::FeatureVector;

pub const FEATURE_NAMES: [&str; FeatureVector::LEN] = [
    "accel_magnitude",
    "gyro_magnitude",
    "accel_delta",
    "gyro_delta",
    "vertical_deviation",
];

/// Label and confidence for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub is_fall: bool,
    /// Probability of the predicted class.
    pub confidence: f64,
}

impl Prediction {
    /// Argmax over `[p_safe, p_fall]`. Ties go to safe.
    pub fn from_probabilities(p_safe: f64, p_fall: f64) -> Self {
        let is_fall = p_fall > p_safe;
        Self {
            is_fall,
            confidence: p_safe.max(p_fall).clamp(0.0, 1.0),
        }
    }
}

pub trait FallScorer: Send {
    fn predict(&mut self, features: &FeatureVector) -> Result<Prediction, ScoreError>;
}

/// Chosen at startup when no usable artifact exists.
#[derive(Debug, Default)]
pub struct DisabledScorer;

impl FallScorer for DisabledScorer {
    fn predict(&mut self, _features: &FeatureVector) -> Result<Prediction, ScoreError> {
        Err(ScoreError::Unavailable("fall detection disabled".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: [f64; 2],
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    #[serde(default)]
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

impl ForestModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let model = Self::from_json(&content)?;
        info!(
            "Fall model loaded from {} ({} trees)",
            path.display(),
            model.tree_count()
        );
        Ok(model)
    }

    pub fn from_json(content: &str) -> Result<Self, ScoreError> {
        let mut model: ForestModel =
            serde_json::from_str(content).map_err(|e| ScoreError::MalformedArtifact(e.to_string()))?;
        model.validate()?;
        model.normalise_leaves();
        Ok(model)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Children must come after their parent, which rules out cycles.
    fn validate(&self) -> Result<(), ScoreError> {
        let malformed = |msg: String| Err(ScoreError::MalformedArtifact(msg));

        if !self.feature_names.is_empty() && self.feature_names != FEATURE_NAMES {
            return malformed(format!(
                "feature order {:?} does not match {:?}",
                self.feature_names, FEATURE_NAMES
            ));
        }
        if self.trees.is_empty() {
            return malformed("ensemble has no trees".to_string());
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return malformed(format!("tree {} has no nodes", t));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= FeatureVector::LEN {
                            return malformed(format!("tree {} node {}: feature index {} out of range", t, i, feature));
                        }
                        if !threshold.is_finite() {
                            return malformed(format!("tree {} node {}: threshold is not finite", t, i));
                        }
                        for child in [*left, *right] {
                            if child <= i || child >= tree.nodes.len() {
                                return malformed(format!("tree {} node {}: bad child index {}", t, i, child));
                            }
                        }
                    }
                    Node::Leaf { value } => {
                        let sum = value[0] + value[1];
                        if value.iter().any(|p| !p.is_finite() || *p < 0.0) || sum <= 0.0 {
                            return malformed(format!("tree {} node {}: invalid leaf {:?}", t, i, value));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Leaves may carry raw class counts; turn them into probabilities.
    fn normalise_leaves(&mut self) {
        for tree in &mut self.trees {
            for node in &mut tree.nodes {
                if let Node::Leaf { value } = node {
                    let sum = value[0] + value[1];
                    value[0] /= sum;
                    value[1] /= sum;
                }
            }
        }
    }

    fn leaf(tree: &Tree, x: &[f64; FeatureVector::LEN]) -> [f64; 2] {
        let mut index = 0;
        loop {
            match &tree.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Mean `[p_safe, p_fall]` over the ensemble.
    pub fn probabilities(&self, features: &FeatureVector) -> [f64; 2] {
        let x = features.as_array();
        let mut total = [0.0, 0.0];
        for tree in &self.trees {
            let leaf = Self::leaf(tree, &x);
            total[0] += leaf[0];
            total[1] += leaf[1];
        }
        let n = self.trees.len() as f64;
        [total[0] / n, total[1] / n]
    }
}

impl FallScorer for ForestModel {
    fn predict(&mut self, features: &FeatureVector) -> Result<Prediction, ScoreError> {
        if !features.is_finite() {
            return Err(ScoreError::MalformedInput(format!("non-finite features {:?}", features)));
        }
        let [p_safe, p_fall] = self.probabilities(features);
        Ok(Prediction::from_probabilities(p_safe, p_fall))
    }
}

type Request = (u64, FeatureVector);
type Response = (u64, Result<Prediction, ScoreError>);

/// Runs another scorer on a worker thread and gives up on it after `timeout`.
///
/// Requests carry a sequence number; answers to earlier requests that arrive
/// late are dropped. While the worker is still busy with a timed-out request,
/// new requests fail fast with `Timeout`.
pub struct TimedScorer {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    next_seq: u64,
    timeout: Duration,
}

impl TimedScorer {
    pub fn spawn<S>(inner: S, timeout: Duration) -> Result<Self, ScoreError>
    where
        S: FallScorer + 'static,
    {
        let (request_tx, request_rx) = bounded::<Request>(1);
        let (response_tx, response_rx) = bounded::<Response>(4);

        thread::Builder::new()
            .name("scorer".into())
            .spawn(move || run_scorer_worker(inner, request_rx, response_tx))
            .map_err(|e| ScoreError::Unavailable(format!("cannot spawn scorer worker: {}", e)))?;

        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            next_seq: 0,
            timeout,
        })
    }

    fn timeout_error(&self) -> ScoreError {
        ScoreError::Timeout(self.timeout.as_millis() as u64)
    }
}

impl FallScorer for TimedScorer {
    fn predict(&mut self, features: &FeatureVector) -> Result<Prediction, ScoreError> {
        self.next_seq += 1;
        let seq = self.next_seq;

        match self.requests.try_send((seq, *features)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(self.timeout_error()),
            Err(TrySendError::Disconnected(_)) => {
                return Err(ScoreError::Unavailable("scorer worker stopped".to_string()))
            }
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok((answered, result)) if answered == seq => return result,
                Ok((stale, _)) => debug!("Dropping late scorer response #{}", stale),
                Err(RecvTimeoutError::Timeout) => return Err(self.timeout_error()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ScoreError::Unavailable("scorer worker stopped".to_string()))
                }
            }
        }
    }
}

fn run_scorer_worker<S: FallScorer>(mut inner: S, requests: Receiver<Request>, responses: Sender<Response>) {
    // Ends when the owning TimedScorer is dropped.
    for (seq, features) in requests.iter() {
        let result = catch_unwind(AssertUnwindSafe(|| inner.predict(&features)))
            .unwrap_or_else(|_| Err(ScoreError::Unavailable("scorer panicked".to_string())));
        if responses.send((seq, result)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_MODEL: &str = include_str!("../../models/fall_model.json");

    /// Always answers with the same prediction.
    pub(crate) struct FixedScorer(pub Prediction);

    impl FallScorer for FixedScorer {
        fn predict(&mut self, _features: &FeatureVector) -> Result<Prediction, ScoreError> {
            Ok(self.0)
        }
    }

    struct SlowScorer {
        delay: Duration,
        calls: u32,
    }

    impl FallScorer for SlowScorer {
        fn predict(&mut self, _features: &FeatureVector) -> Result<Prediction, ScoreError> {
            self.calls += 1;
            // Only the first call is slow.
            if self.calls == 1 {
                thread::sleep(self.delay);
            }
            Ok(Prediction::from_probabilities(0.2, 0.8))
        }
    }

    fn stationary() -> FeatureVector {
        FeatureVector {
            accel_magnitude: 1.0,
            ..FeatureVector::default()
        }
    }

    fn impact() -> FeatureVector {
        FeatureVector {
            accel_magnitude: 2.6,
            gyro_magnitude: 210.0,
            accel_delta: 1.5,
            gyro_delta: 200.0,
            vertical_deviation: 1.2,
        }
    }

    #[test]
    fn sample_model_separates_rest_from_impact() {
        let mut model = ForestModel::from_json(SAMPLE_MODEL).unwrap();
        assert_eq!(model.tree_count(), 3);

        let rest = model.predict(&stationary()).unwrap();
        assert!(!rest.is_fall);
        assert!(rest.confidence > 0.9);

        let fall = model.predict(&impact()).unwrap();
        assert!(fall.is_fall);
        assert!(fall.confidence > 0.9);
    }

    #[test]
    fn leaves_with_counts_are_normalised() {
        let json = r#"{"trees":[{"nodes":[{"value":[30,10]}]}]}"#;
        let model = ForestModel::from_json(json).unwrap();
        assert_eq!(model.probabilities(&stationary()), [0.75, 0.25]);
    }

    #[test]
    fn malformed_artifacts_are_rejected() {
        for json in [
            "not json",
            r#"{"trees":[]}"#,
            r#"{"trees":[{"nodes":[]}]}"#,
            r#"{"trees":[{"nodes":[{"feature":7,"threshold":1.0,"left":1,"right":2},{"value":[1,0]},{"value":[0,1]}]}]}"#,
            r#"{"trees":[{"nodes":[{"feature":0,"threshold":1.0,"left":0,"right":1},{"value":[1,0]}]}]}"#,
            r#"{"trees":[{"nodes":[{"value":[0,0]}]}]}"#,
            r#"{"feature_names":["a","b","c","d","e"],"trees":[{"nodes":[{"value":[1,0]}]}]}"#,
        ] {
            assert!(
                matches!(ForestModel::from_json(json), Err(ScoreError::MalformedArtifact(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ForestModel::load(dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.fault_kind(), crate::error::FaultKind::ClassificationUnavailable);
    }

    #[test]
    fn non_finite_features_are_rejected() {
        let mut model = ForestModel::from_json(SAMPLE_MODEL).unwrap();
        let features = FeatureVector {
            accel_magnitude: f64::NAN,
            ..FeatureVector::default()
        };
        assert!(matches!(model.predict(&features), Err(ScoreError::MalformedInput(_))));
    }

    #[test]
    fn disabled_scorer_is_unavailable() {
        assert!(matches!(
            DisabledScorer.predict(&stationary()),
            Err(ScoreError::Unavailable(_))
        ));
    }

    #[test]
    fn timed_scorer_passes_answers_through() {
        let expected = Prediction::from_probabilities(0.05, 0.95);
        let mut scorer = TimedScorer::spawn(FixedScorer(expected), Duration::from_millis(500)).unwrap();
        for _ in 0..5 {
            assert_eq!(scorer.predict(&impact()).unwrap(), expected);
        }
    }

    #[test]
    fn timed_scorer_times_out_and_drops_late_answer() {
        let slow = SlowScorer {
            delay: Duration::from_millis(200),
            calls: 0,
        };
        let mut scorer = TimedScorer::spawn(slow, Duration::from_millis(20)).unwrap();

        assert!(matches!(scorer.predict(&impact()), Err(ScoreError::Timeout(20))));

        // Let the worker finish the slow request; its answer is stale now.
        thread::sleep(Duration::from_millis(300));
        scorer.timeout = Duration::from_millis(500);
        let fresh = scorer.predict(&impact()).unwrap();
        assert!(fresh.is_fall);
    }
}
