// Simulated IMU bus and PPG sensor for bench runs without hardware.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bus::ImuBus;
use super::imu::{encode_frame, FRAME_LEN, REG_ACCEL_XOUT_H, REG_PWR_MGMT_1};
use super::ppg::{PpgSample, PpgSource};
use crate::error::{BusError, SensorError};

const FALL_BURST: Duration = Duration::from_millis(600);

/// Stationary device with sensor noise, plus a synthetic impact every
/// `fall_every` and random NACKs at `nack_rate`.
pub struct SimulatedImuBus {
    address: u8,
    rng: StdRng,
    started: Instant,
    fall_every: Option<Duration>,
    nack_rate: f64,
    awake: bool,
}

impl SimulatedImuBus {
    pub fn new(address: u8, fall_every: Option<Duration>, nack_rate: f64) -> Self {
        Self {
            address,
            rng: StdRng::from_os_rng(),
            started: Instant::now(),
            fall_every,
            nack_rate: nack_rate.clamp(0.0, 1.0),
            awake: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn in_fall_burst(&self) -> bool {
        match self.fall_every {
            Some(period) if !period.is_zero() => {
                let elapsed = self.started.elapsed();
                if elapsed < period {
                    return false;
                }
                let phase = elapsed.as_nanos() % period.as_nanos();
                phase < FALL_BURST.as_nanos()
            }
            _ => false,
        }
    }

    fn sample(&mut self) -> [u8; FRAME_LEN] {
        let temperature = 31.0 + self.rng.random_range(-0.2..0.2);
        if self.in_fall_burst() {
            let accel = [
                self.rng.random_range(-1.8..1.8),
                self.rng.random_range(-1.8..1.8),
                self.rng.random_range(1.2..1.99),
            ];
            let gyro = [
                self.rng.random_range(150.0..240.0),
                self.rng.random_range(-240.0..-150.0),
                self.rng.random_range(-60.0..60.0),
            ];
            encode_frame(accel, gyro, temperature)
        } else {
            let accel = [
                self.rng.random_range(-0.02..0.02),
                self.rng.random_range(-0.02..0.02),
                1.0 + self.rng.random_range(-0.02..0.02),
            ];
            let gyro = [
                self.rng.random_range(-1.5..1.5),
                self.rng.random_range(-1.5..1.5),
                self.rng.random_range(-1.5..1.5),
            ];
            encode_frame(accel, gyro, temperature)
        }
    }
}

impl ImuBus for SimulatedImuBus {
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        if addr != self.address {
            return Err(BusError::Nack { addr });
        }
        if reg == REG_PWR_MGMT_1 {
            self.awake = value & 0x40 == 0;
        }
        Ok(())
    }

    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if addr != self.address || self.rng.random_bool(self.nack_rate) {
            return Err(BusError::Nack { addr });
        }
        if !self.awake {
            return Err(BusError::Io("sensor asleep".to_string()));
        }
        if reg != REG_ACCEL_XOUT_H {
            buf.fill(0);
            return Ok(());
        }
        let raw = self.sample();
        let n = buf.len().min(FRAME_LEN);
        buf[..n].copy_from_slice(&raw[..n]);
        Ok(())
    }
}

/// Pulsatile red/IR waveform for a finger resting on the sensor.
pub struct SimulatedPpgSource {
    rng: StdRng,
    sample_rate_hz: f64,
    bpm: f64,
    red_modulation: f64,
    started: Option<Instant>,
    emitted: u64,
}

const IR_DC: f64 = 110_000.0;
const RED_DC: f64 = 95_000.0;
const IR_MODULATION: f64 = 0.012;

impl SimulatedPpgSource {
    pub fn new(sample_rate_hz: f64, bpm: f64, spo2: f64) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            sample_rate_hz,
            bpm,
            red_modulation: ratio_for_spo2(spo2) * IR_MODULATION,
            started: None,
            emitted: 0,
        }
    }

    fn sample_at(&mut self, n: u64) -> PpgSample {
        let t = n as f64 / self.sample_rate_hz;
        let pulse = (2.0 * std::f64::consts::PI * self.bpm / 60.0 * t).cos();
        let noise = self.rng.random_range(-40.0..40.0);
        PpgSample {
            red: (RED_DC * (1.0 + self.red_modulation * pulse) + noise).max(0.0) as u32,
            ir: (IR_DC * (1.0 + IR_MODULATION * pulse) + noise).max(0.0) as u32,
        }
    }
}

/// Ratio-of-ratios that maps to `spo2` on the descending branch of the
/// calibration curve.
fn ratio_for_spo2(spo2: f64) -> f64 {
    let (a, b, c) = (-45.060, 30.354, 94.845 - spo2);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        -b / (2.0 * a)
    } else {
        (-b - disc.sqrt()) / (2.0 * a)
    }
}

impl PpgSource for SimulatedPpgSource {
    fn init(&mut self) -> Result<(), SensorError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(SensorError::unavailable("ppg", "sample rate must be positive"));
        }
        self.started = Some(Instant::now());
        self.emitted = 0;
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<PpgSample>) -> Result<usize, SensorError> {
        let started = self
            .started
            .ok_or_else(|| SensorError::unavailable("ppg", "sensor not initialised"))?;
        let due = (started.elapsed().as_secs_f64() * self.sample_rate_hz) as u64;
        let mut count = 0;
        while self.emitted < due {
            let sample = self.sample_at(self.emitted);
            out.push(sample);
            self.emitted += 1;
            count += 1;
        }
        Ok(count)
    }

    fn shutdown(&mut self) {
        self.started = None;
    }
}
