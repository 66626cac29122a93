pub mod record;
pub mod channels;
pub mod mqtt;
pub mod dispatcher;

pub use channels::{AlertChannel, ConsoleChannel, JsonLinesChannel};
pub use dispatcher::AlertDispatcher;
pub use mqtt::MqttChannel;
pub use record::{AlertLocation, AlertRecord};
