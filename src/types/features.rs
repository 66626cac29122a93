/// Features fed to the fall scorer, in the order the artifact expects them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    pub accel_magnitude: f64,
    pub gyro_magnitude: f64,
    pub accel_delta: f64,
    pub gyro_delta: f64,
    pub vertical_deviation: f64,
}

impl FeatureVector {
    pub const LEN: usize = 5;

    pub fn as_array(&self) -> [f64; Self::LEN] {
        [
            self.accel_magnitude,
            self.gyro_magnitude,
            self.accel_delta,
            self.gyro_delta,
            self.vertical_deviation,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}
