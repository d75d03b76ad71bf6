//! Core data models for the Clairity service
//!
//! This module contains the historical series, forecast and per-city report
//! types shared by the data sources, the trend estimator and the API.

pub mod report;
pub mod series;

pub use report::{
    AirQualityReport, CityAirQuality, CityFailure, CityReport, CurrentReading, ForecastBlend,
    ForecastEntry,
};
pub use series::{HistoricalSample, HistoricalSeries, HistoryPoint};
