use chrono::{DateTime, Local};

/// One 6-axis IMU sample plus die temperature, already in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFrame {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub temperature: f64,
    pub captured_at: DateTime<Local>,
}

impl MotionFrame {
    pub fn new(
        accel: [f64; 3],
        gyro: [f64; 3],
        temperature: f64,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            ax: accel[0],
            ay: accel[1],
            az: accel[2],
            gx: gyro[0],
            gy: gyro[1],
            gz: gyro[2],
            temperature,
            captured_at,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }

    pub fn accel_magnitude(&self) -> f64 {
        (self.ax * self.ax + self.ay * self.ay + self.az * self.az).sqrt()
    }

    pub fn gyro_magnitude(&self) -> f64 {
        (self.gx * self.gx + self.gy * self.gy + self.gz * self.gz).sqrt()
    }
}
