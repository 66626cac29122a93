use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::{error, info};

use super::channels::AlertChannel;
use super::record::AlertRecord;
use crate::gps::LocationProvider;
use crate::types::{ClassificationResult, FallState, MotionFrame, VitalsSnapshot};
use crate::utils::now_millis;

/// Fans one fall event out to every configured channel.
///
/// Channels are independent: an error or a panic in one is logged and the
/// remaining channels still run.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
    location: Arc<dyn LocationProvider>,
    dispatched: u64,
    channel_failures: u64,
}

impl AlertDispatcher {
    pub fn new(location: Arc<dyn LocationProvider>) -> Self {
        Self {
            channels: Vec::new(),
            location,
            dispatched: 0,
            channel_failures: 0,
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn AlertChannel>) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn add_channel(&mut self, channel: Box<dyn AlertChannel>) {
        info!("Alert channel enabled: {}", channel.name());
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn dispatch(
        &mut self,
        classification: &ClassificationResult,
        vitals: &VitalsSnapshot,
        frame: &MotionFrame,
        fall_state: &FallState,
    ) {
        let location = self.location.latest_snapshot();
        let record = AlertRecord::compose(
            now_millis(),
            classification,
            vitals,
            frame,
            fall_state.fall_count,
            &location,
        );
        self.dispatched += 1;

        info!(
            "Fall #{} detected (confidence {:.2}), notifying {} channel(s)",
            fall_state.fall_count,
            classification.confidence,
            self.channels.len()
        );

        for channel in &mut self.channels {
            let outcome = catch_unwind(AssertUnwindSafe(|| channel.send(&record)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.channel_failures += 1;
                    error!("Alert channel '{}' failed [{:?}]: {}", channel.name(), e.fault_kind(), e);
                }
                Err(_) => {
                    self.channel_failures += 1;
                    error!("Alert channel '{}' panicked", channel.name());
                }
            }
        }
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn channel_failures(&self) -> u64 {
        self.channel_failures
    }
}
