use anyhow::{Context, Result};
use pricerelay::config::Config;
use pricerelay::publish::MqttPublisher;
use pricerelay::relay::{CadenceKind, Relay, Topics};
use pricerelay::source::{AmberApi, PriceSourceClient};
use pricerelay::{APP_VERSION, logging, shutdown};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;
    config.validate().context("Invalid configuration")?;

    info!("Pricerelay {} starting up", APP_VERSION);

    let tz = config.timezone()?;
    let api = AmberApi::new(&config.amber)?;
    let site = (!config.amber.site_id.trim().is_empty()).then_some(config.amber.site_id.as_str());
    // Without a site there is nothing to relay; refuse to start
    let client = PriceSourceClient::connect(
        api,
        site,
        Duration::from_secs(config.schedule.min_poll_interval_seconds),
    )
    .await
    .context("Could not resolve pricing site")?;

    let publisher = MqttPublisher::connect(&config.mqtt);

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_signals(trigger));

    let mut relay = Relay::new(
        client,
        publisher,
        config.tariffs.tariff_set(),
        Topics::new(&config.mqtt.topic_prefix),
        tz,
    )
    .with_wait_granularity(Duration::from_secs(
        config.schedule.wait_granularity_seconds,
    ));

    let now = chrono::Utc::now();
    let lag = config.schedule.lag_allowance_seconds;
    relay.add_cadence(
        CadenceKind::Bid,
        config.schedule.bid_cadence_minutes,
        lag,
        now,
    );
    relay.add_cadence(
        CadenceKind::Settled,
        config.schedule.settled_cadence_minutes,
        lag,
        now,
    );

    let result = relay.run(shutdown).await;
    relay.publisher().shutdown().await;

    match result {
        Ok(()) => {
            info!("Relay shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Relay failed with error: {}", e);
            Err(anyhow::anyhow!("Relay error: {}", e))
        }
    }
}
