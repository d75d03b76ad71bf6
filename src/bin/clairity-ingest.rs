//! Loads sensor readings into the local store.
//!
//! Reads JSON lines of `{"timestamp": "...", "aqi": ...}` from stdin and
//! writes them to the store at `store.path`. The server must be stopped:
//! the store accepts one open handle at a time.

use std::io;

use anyhow::{Context, Result};
use clairity::{ClairityConfig, FjallSensorStore, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClairityConfig::load()?;
    let _telemetry = telemetry::init(&config.logging)?;

    let path = config
        .store
        .path
        .as_deref()
        .context("store.path is not configured")?;
    let store = FjallSensorStore::create(path).with_context(|| {
        format!("Failed to open sensor store at {path}; is the server still running?")
    })?;

    let count = store
        .import(io::stdin().lock())
        .context("Failed to import sensor readings")?;
    tracing::info!("Imported {} readings into {}", count, path);
    Ok(())
}
