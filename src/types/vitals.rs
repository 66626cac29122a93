/// Latest heart rate / SpO2 published by the PPG task.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VitalsSnapshot {
    pub heart_rate_bpm: f64,
    pub spo2: Option<f64>,
    pub finger_detected: bool,
}

impl VitalsSnapshot {
    /// Builds a snapshot keeping `finger_detected` consistent with the heart rate.
    pub fn new(heart_rate_bpm: f64, spo2: Option<f64>) -> Self {
        Self {
            heart_rate_bpm,
            spo2,
            finger_detected: heart_rate_bpm > 0.0,
        }
    }

    pub fn no_contact() -> Self {
        Self::default()
    }
}
