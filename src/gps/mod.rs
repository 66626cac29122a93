pub mod nmea;
pub mod tracker;
pub mod feed;

pub use feed::{open_feed, NmeaFeed};
pub use tracker::{DisabledLocation, LocationProvider, LocationTracker};
