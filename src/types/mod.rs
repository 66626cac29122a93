pub mod motion_frame;
pub mod features;
pub mod vitals;
pub mod location;
pub mod fall;
pub mod results;

pub use motion_frame::MotionFrame;
pub use features::FeatureVector;
pub use vitals::VitalsSnapshot;
pub use location::{GpsStatus, LocationSnapshot};
pub use fall::{ClassificationResult, FallState};
pub use results::{RunCounters, ShutdownReport};
