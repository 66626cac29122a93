// MPU6050/MPU9250 accelerometer + gyroscope reader over the shared I2C bus.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Local};
use log::info;

use super::bus::{BusGuard, ImuBus};
use super::retry::RetryPolicy;
use crate::error::{ReadError, SensorError};
use crate::types::MotionFrame;
use crate::utils::{now_millis, round_to};

pub const DEFAULT_ADDRESS: u8 = 0x68;

// Register map
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B; // start of the 14-byte accel/temp/gyro burst

pub const FRAME_LEN: usize = 14;

// Scale factors
pub const ACCEL_SCALE_2G: f64 = 16384.0; // LSB/g at ±2 g
pub const GYRO_SCALE_250: f64 = 131.0; // LSB/°/s at ±250 °/s
pub const TEMP_SENSITIVITY: f64 = 340.0;
pub const TEMP_OFFSET_C: f64 = 36.53;

/// Anything that can produce one motion frame per call.
pub trait MotionSource: Send {
    fn read_frame(&mut self) -> Result<MotionFrame, ReadError>;
}

pub struct InertialReader<B> {
    bus: Arc<BusGuard<B>>,
    address: u8,
    policy: RetryPolicy,
    last_timestamp_ms: Option<i64>,
}

impl<B: ImuBus> InertialReader<B> {
    pub fn new(bus: Arc<BusGuard<B>>, address: u8, policy: RetryPolicy) -> Self {
        Self {
            bus,
            address,
            policy,
            last_timestamp_ms: None,
        }
    }

    /// Wake the sensor (clear the SLEEP bit).
    pub fn init(&self) -> Result<(), SensorError> {
        self.bus
            .with_exclusive_access(|bus| bus.write_register(self.address, REG_PWR_MGMT_1, 0x00))
            .map_err(|e| SensorError::unavailable("imu", e.to_string()))?;

        info!(
            "IMU at 0x{:02X} initialised (±2g, ±250°/s)",
            self.address
        );
        Ok(())
    }

    /// Read one frame, retrying transient bus failures. The bus lock is taken
    /// per attempt and released before any backoff sleep.
    pub fn read_frame(&mut self) -> Result<MotionFrame, ReadError> {
        let address = self.address;
        let bus = &self.bus;
        let raw = self
            .policy
            .run(|_attempt| {
                let mut raw = [0u8; FRAME_LEN];
                bus.with_exclusive_access(|bus| bus.read_block(address, REG_ACCEL_XOUT_H, &mut raw))
                    .map(|()| raw)
            })
            .map_err(|exhausted| ReadError::Failed {
                attempts: exhausted.attempts,
                last: exhausted.last,
            })?;

        let captured_at = self.next_timestamp(now_millis());
        Ok(decode_frame(&raw, captured_at))
    }

    /// Millisecond timestamps strictly increase, even when two reads land in
    /// the same millisecond or the wall clock steps back.
    fn next_timestamp(&mut self, now: DateTime<Local>) -> DateTime<Local> {
        let stamped = match self.last_timestamp_ms {
            Some(last) if now.timestamp_millis() <= last => {
                now + ChronoDuration::milliseconds(last - now.timestamp_millis() + 1)
            }
            _ => now,
        };
        self.last_timestamp_ms = Some(stamped.timestamp_millis());
        stamped
    }
}

impl<B: ImuBus> MotionSource for InertialReader<B> {
    fn read_frame(&mut self) -> Result<MotionFrame, ReadError> {
        InertialReader::read_frame(self)
    }
}

/// Convert a raw big-endian burst into physical units.
pub fn decode_frame(raw: &[u8; FRAME_LEN], captured_at: DateTime<Local>) -> MotionFrame {
    let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]) as f64;

    MotionFrame {
        ax: round_to(word(0) / ACCEL_SCALE_2G, 4),
        ay: round_to(word(2) / ACCEL_SCALE_2G, 4),
        az: round_to(word(4) / ACCEL_SCALE_2G, 4),
        temperature: round_to(word(6) / TEMP_SENSITIVITY + TEMP_OFFSET_C, 2),
        gx: round_to(word(8) / GYRO_SCALE_250, 4),
        gy: round_to(word(10) / GYRO_SCALE_250, 4),
        gz: round_to(word(12) / GYRO_SCALE_250, 4),
        captured_at,
    }
}

/// Inverse of [`decode_frame`] for the given physical values; used by the
/// simulated bus and tests.
pub fn encode_frame(accel: [f64; 3], gyro: [f64; 3], temperature: f64) -> [u8; FRAME_LEN] {
    let clamp = |v: f64| v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    let words = [
        clamp(accel[0] * ACCEL_SCALE_2G),
        clamp(accel[1] * ACCEL_SCALE_2G),
        clamp(accel[2] * ACCEL_SCALE_2G),
        clamp((temperature - TEMP_OFFSET_C) * TEMP_SENSITIVITY),
        clamp(gyro[0] * GYRO_SCALE_250),
        clamp(gyro[1] * GYRO_SCALE_250),
        clamp(gyro[2] * GYRO_SCALE_250),
    ];

    let mut raw = [0u8; FRAME_LEN];
    for (i, w) in words.iter().enumerate() {
        raw[i * 2..i * 2 + 2].copy_from_slice(&w.to_be_bytes());
    }
    raw
}
