//! Outbound price channels
//!
//! A [`Publisher`] pushes scalar prices to named topics. The MQTT
//! implementation connects once, keeps its event loop running in the
//! background, and reconnects with backoff whenever the broker drops.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::error::{RelayError, Result};
use crate::logging::{StructuredLogger, get_logger};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 64;

/// Sink for derived prices
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, value: f64) -> Result<()>;
}

/// Payload representation of a price
pub fn format_value(value: f64) -> String {
    format!("{:.4}", value)
}

pub struct MqttPublisher {
    client: AsyncClient,
    retain: bool,
    event_task: JoinHandle<()>,
}

impl MqttPublisher {
    /// Create the client and spawn its connection loop.
    ///
    /// Returns immediately; the first connect happens in the background so a
    /// broker that is down at startup does not stop the relay.
    pub fn connect(cfg: &MqttConfig) -> Self {
        let client_id = if cfg.client_id.trim().is_empty() {
            format!("pricerelay-{}", uuid::Uuid::new_v4().simple())
        } else {
            cfg.client_id.clone()
        };
        let mut options = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_seconds.max(5)));
        if !cfg.username.is_empty() {
            options.set_credentials(cfg.username.clone(), cfg.password.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let logger = get_logger("mqtt");
        let event_task = tokio::spawn(drive_event_loop(event_loop, logger));
        Self {
            client,
            retain: cfg.retain,
            event_task,
        }
    }

    /// Send DISCONNECT and stop the background loop
    pub async fn shutdown(&self) {
        let _ = self.client.disconnect().await;
        self.event_task.abort();
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, value: f64) -> Result<()> {
        // try_publish never waits on a full queue while the broker is away
        self.client
            .try_publish(topic, QoS::AtMostOnce, self.retain, format_value(value))
            .map_err(|e| RelayError::publish(topic.to_string(), e.to_string()))
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, logger: StructuredLogger) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff = INITIAL_BACKOFF;
                logger.info("Connected to MQTT broker");
            }
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                logger.info(&format!(
                    "Got message on {}: {}",
                    msg.topic,
                    String::from_utf8_lossy(&msg.payload)
                ));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                logger.warn("Broker sent disconnect");
            }
            Ok(event) => logger.trace(&format!("MQTT event {:?}", event)),
            Err(e) => {
                logger.error(&format!(
                    "Disconnected from MQTT broker: {}; retrying in {:?}",
                    e, backoff
                ));
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff(INITIAL_BACKOFF), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(40)), MAX_BACKOFF);
        assert_eq!(next_backoff(MAX_BACKOFF), MAX_BACKOFF);
    }

    #[test]
    fn values_formatted_with_four_decimals() {
        assert_eq!(format_value(8.9), "8.9000");
        assert_eq!(format_value(-0.123456), "-0.1235");
    }
}
