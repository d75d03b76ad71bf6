use std::sync::Arc;

use anyhow::{Context, Result};
use clairity::{CityAggregator, ClairityConfig, FjallSensorStore, WaqiClient, api, telemetry, web};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClairityConfig::load()?;
    let _telemetry = telemetry::init(&config.logging)?;

    for problem in config.alias_problems() {
        tracing::warn!("City table: {}", problem);
    }

    let waqi = Arc::new(WaqiClient::new(&config.waqi).context("Failed to create WAQI client")?);
    let mut aggregator = CityAggregator::new(&config, waqi.clone(), waqi);

    if let (Some(path), Some(city)) = (&config.store.path, &config.store.city) {
        let store = FjallSensorStore::open(path)
            .with_context(|| format!("Failed to open sensor store at {path}"))?;
        if store.is_empty()? {
            tracing::warn!("Sensor store {} holds no readings; load them with clairity-ingest", path);
        }
        tracing::info!("Serving '{}' from sensor store {}", city, path);
        aggregator = aggregator.with_store(city.clone(), Arc::new(store));
    }

    web::run(api::router(Arc::new(aggregator)), &config.bind_address()).await?;
    Ok(())
}
