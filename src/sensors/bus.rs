use std::sync::{Mutex, PoisonError};

use crate::error::BusError;

/// Register-level access to the I2C bus shared by the IMU.
pub trait ImuBus: Send {
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError>;

    /// Burst-read `buf.len()` bytes starting at `reg`.
    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError>;
}

impl<B: ImuBus + ?Sized> ImuBus for Box<B> {
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        (**self).write_register(addr, reg, value)
    }

    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read_block(addr, reg, buf)
    }
}

/// Serializes transactions on a shared bus.
///
/// The lock is held only while `op` runs and is released on every exit path,
/// including unwinding. A lock poisoned by a panicking holder is recovered:
/// bus transactions are self-contained, so the next caller starts clean.
pub struct BusGuard<B> {
    bus: Mutex<B>,
}

impl<B: ImuBus> BusGuard<B> {
    pub fn new(bus: B) -> Self {
        Self { bus: Mutex::new(bus) }
    }

    pub fn with_exclusive_access<T>(&self, op: impl FnOnce(&mut B) -> T) -> T {
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut bus)
    }
}
