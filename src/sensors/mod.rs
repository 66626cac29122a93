pub mod bus;
pub mod retry;
pub mod imu;
pub mod ppg;
pub mod vitals;
pub mod simulated;

pub use bus::{BusGuard, ImuBus};
pub use retry::RetryPolicy;
pub use imu::{InertialReader, MotionSource};
pub use ppg::{PpgSample, PpgSource};
pub use vitals::{DisabledVitals, VitalsReader, VitalsSource};
pub use simulated::{SimulatedImuBus, SimulatedPpgSource};
