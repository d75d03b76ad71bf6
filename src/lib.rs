//! `Clairity` - PM2.5 air quality aggregation
//!
//! This library fetches current readings and forecasts from the WAQI feed,
//! fits a short-term trend over the recent history of each station, blends
//! trend and forecast, and serves the per-city result over HTTP.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod history;
pub mod models;
pub mod store;
pub mod telemetry;
pub mod trend;
pub mod waqi;
pub mod web;

// Re-export core types for public API
pub use aggregator::CityAggregator;
pub use config::{CityConfig, ClairityConfig};
pub use error::ClairityError;
pub use feed::{AirQualityFeed, StationSnapshot};
pub use history::{HistorySource, LookbackWindow};
pub use models::{AirQualityReport, CityReport, HistoricalSample, HistoricalSeries};
pub use store::{FjallSensorStore, SensorStore};
pub use waqi::WaqiClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, ClairityError>;
