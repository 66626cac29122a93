use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dotenv::dotenv;
use log::{error, info, warn};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use serde::Serialize;

use super::channels::AlertChannel;
use super::record::AlertRecord;
use crate::config::MqttAlertConfig;
use crate::error::DispatchError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MqttAlert<'a> {
    alert: &'a AlertRecord,
    emergency_contacts: &'a [String],
}

/// Pushes alerts to an MQTT broker. The network event loop runs on its own thread.
pub struct MqttChannel {
    client: Client,
    topic: String,
    contacts: Vec<String>,
    stop: Arc<AtomicBool>,
}

impl MqttChannel {
    pub fn connect(config: &MqttAlertConfig, contacts: Vec<String>) -> Result<Self, DispatchError> {
        dotenv().ok(); // MQTT_USER / MQTT_PASS

        let mut mqtt_options = MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        match (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
            (Ok(user), Ok(pass)) => {
                mqtt_options.set_credentials(user, pass);
            }
            _ => info!("MQTT_USER/MQTT_PASS not set, connecting anonymously"),
        }

        mqtt_options
            .set_keep_alive(Duration::from_secs(config.keep_alive.max(5) as u64))
            .set_last_will(LastWill::new(
                format!("{}/status", config.topic),
                "offline",
                QoS::AtLeastOnce,
                false,
            ));

        let (client, connection) = Client::new(mqtt_options, 10);
        let stop = Arc::new(AtomicBool::new(false));

        let loop_stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("mqtt-alerts".into())
            .spawn(move || run_event_loop(connection, loop_stop))
            .map_err(|e| DispatchError::Rejected {
                channel: "mqtt".to_string(),
                reason: format!("cannot spawn event loop: {}", e),
            })?;

        info!(
            "MQTT alert channel -> {}:{} topic '{}'",
            config.broker, config.port, config.topic
        );
        Ok(Self {
            client,
            topic: config.topic.clone(),
            contacts,
            stop,
        })
    }
}

impl AlertChannel for MqttChannel {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn send(&mut self, record: &AlertRecord) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(&MqttAlert {
            alert: record,
            emergency_contacts: &self.contacts,
        })
        .map_err(|source| DispatchError::Encode {
            channel: self.name().to_string(),
            source,
        })?;

        // Never block the sampling loop on the network.
        self.client
            .try_publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| DispatchError::Rejected {
                channel: self.name().to_string(),
                reason: e.to_string(),
            })?;

        if !self.contacts.is_empty() {
            info!("Alert queued for emergency contacts: {}", self.contacts.join(", "));
        }
        Ok(())
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.client.try_disconnect();
    }
}

fn run_event_loop(mut connection: Connection, stop: Arc<AtomicBool>) {
    for event in connection.iter() {
        if stop.load(Ordering::Relaxed) {
            info!("MQTT alert thread received shutdown signal, exiting gracefully");
            break;
        }

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("MQTT alert channel connected"),
            Ok(Event::Incoming(Packet::PubAck(ack))) => info!("MQTT alert {} acknowledged", ack.pkid),
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
    if !stop.load(Ordering::Relaxed) {
        error!("MQTT event loop ended unexpectedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::record::tests::{fixed_location, sample_record};

    #[test]
    fn payload_carries_alert_and_contacts() {
        let record = sample_record(&fixed_location());
        let contacts = vec!["+1234567890".to_string(), "+0987654321".to_string()];
        let payload = serde_json::to_value(MqttAlert {
            alert: &record,
            emergency_contacts: &contacts,
        })
        .unwrap();

        assert_eq!(payload["alert"]["eventType"], "fall_detected");
        assert_eq!(payload["emergencyContacts"][1], "+0987654321");
    }

    #[test]
    fn publish_is_queued_without_a_broker() {
        let config = MqttAlertConfig {
            broker: "127.0.0.1".to_string(),
            port: 1,
            ..MqttAlertConfig::default()
        };
        let mut channel = MqttChannel::connect(&config, Vec::new()).unwrap();
        assert!(channel.send(&sample_record(&fixed_location())).is_ok());
    }
}
