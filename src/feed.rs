//! Current reading and forecast retrieval

use async_trait::async_trait;

use crate::Result;
use crate::models::{CurrentReading, ForecastEntry};

/// What the feed knows about a station right now
#[derive(Debug, Clone, PartialEq)]
pub struct StationSnapshot {
    /// Identifier used for the history lookup
    pub station_id: String,
    pub current: CurrentReading,
    /// Daily PM2.5 forecast; empty when the feed has none
    pub forecast: Vec<ForecastEntry>,
}

#[async_trait]
pub trait AirQualityFeed: Send + Sync {
    /// Fetch the snapshot for a configured station code.
    ///
    /// Fails with `HttpStatus` on a non-success response and with
    /// `MissingCurrent` when the station reports no PM2.5 value.
    async fn station_snapshot(&self, station_code: &str) -> Result<StationSnapshot>;
}
