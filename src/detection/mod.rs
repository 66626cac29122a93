pub mod features;
pub mod scorer;
pub mod state;
pub mod classifier;

pub use classifier::FallClassifier;
pub use features::FeatureExtractor;
pub use scorer::{DisabledScorer, FallScorer, ForestModel, Prediction, TimedScorer};
pub use state::{FallStateMachine, Transition};
