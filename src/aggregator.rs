//! Per-city assembly of the aggregate air quality report
//!
//! Cities are processed one at a time in declared order. Each city either
//! mirrors an earlier city's report (alias), reads the sensor store, or pulls
//! its snapshot and history from the feed. Failures stay inside the city that
//! produced them.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{info, instrument, warn};

use crate::config::{CityConfig, ClairityConfig};
use crate::feed::{AirQualityFeed, StationSnapshot};
use crate::history::{HistorySource, LookbackWindow};
use crate::models::{
    AirQualityReport, CityAirQuality, CityReport, CurrentReading, ForecastBlend, HistoricalSeries,
};
use crate::store::SensorStore;
use crate::trend::{TrendModel, blend};
use crate::{ClairityError, Result};

/// Sensor store bound to the one city it serves
pub struct StoreBinding {
    pub city_key: String,
    pub store: Arc<dyn SensorStore>,
}

pub struct CityAggregator {
    cities: Vec<CityConfig>,
    lookback_days: u32,
    feed: Arc<dyn AirQualityFeed>,
    history: Arc<dyn HistorySource>,
    store: Option<StoreBinding>,
}

/// Inputs gathered for one city before trend and blend are applied
struct CityInputs {
    current: CurrentReading,
    forecast: ForecastBlend,
    history: Option<HistoricalSeries>,
}

impl CityAggregator {
    pub fn new(
        config: &ClairityConfig,
        feed: Arc<dyn AirQualityFeed>,
        history: Arc<dyn HistorySource>,
    ) -> Self {
        Self {
            cities: config.cities.clone(),
            lookback_days: config.history.lookback_days,
            feed,
            history,
            store: None,
        }
    }

    /// Serve `city_key` from the sensor store instead of the feed
    #[must_use]
    pub fn with_store(mut self, city_key: impl Into<String>, store: Arc<dyn SensorStore>) -> Self {
        self.store = Some(StoreBinding {
            city_key: city_key.into(),
            store,
        });
        self
    }

    /// Build the report for every configured city as of now
    pub async fn aggregate(&self) -> AirQualityReport {
        self.aggregate_at(Local::now().naive_local()).await
    }

    /// Build the report with the lookback window ending at `now`
    #[instrument(skip(self), fields(cities = self.cities.len()))]
    pub async fn aggregate_at(&self, now: NaiveDateTime) -> AirQualityReport {
        let window = LookbackWindow::ending_at(now, self.lookback_days);
        let mut report = AirQualityReport::new();

        for city in &self.cities {
            if let Some(target) = &city.alias_of {
                // only a successful target counts as processed
                match report.get(target).filter(|source| source.is_ready()) {
                    Some(source) => {
                        let copy = source.renamed(&city.name);
                        report.insert(city.key.clone(), copy);
                    }
                    None => warn!(
                        city = %city.key,
                        target = %target,
                        "Alias target has no successful report, skipping"
                    ),
                }
                continue;
            }

            info!(city = %city.key, "Processing city");
            let entry = match self.process_city(city, &window).await {
                Ok(ready) => CityReport::Ready(ready),
                Err(e) => {
                    warn!(city = %city.key, "City failed: {}", e);
                    CityReport::failed(&city.name, e.to_string())
                }
            };
            report.insert(city.key.clone(), entry);
        }

        report
    }

    async fn process_city(
        &self,
        city: &CityConfig,
        window: &LookbackWindow,
    ) -> Result<CityAirQuality> {
        let inputs = match &self.store {
            Some(binding) if binding.city_key == city.key => {
                self.store_inputs(binding.store.as_ref(), window).await?
            }
            _ => self.feed_inputs(city, window).await?,
        };

        assemble(&city.name, inputs)
    }

    async fn feed_inputs(&self, city: &CityConfig, window: &LookbackWindow) -> Result<CityInputs> {
        let StationSnapshot {
            station_id,
            current,
            forecast,
        } = self.feed.station_snapshot(&city.code).await?;

        info!(
            city = %city.key,
            station = %station_id,
            pm25 = current.value,
            "Current reading at {}",
            current.time
        );

        let history = self.history.fetch_history(&station_id, window).await;
        match &history {
            Some(series) => info!(
                city = %city.key,
                "Historical records: {} from {} to {}",
                series.len(),
                series.first().timestamp,
                series.last().timestamp
            ),
            None => info!(city = %city.key, "No historical data available"),
        }

        Ok(CityInputs {
            current,
            forecast: ForecastBlend::from_entries(&forecast),
            history,
        })
    }

    async fn store_inputs(
        &self,
        store: &dyn SensorStore,
        window: &LookbackWindow,
    ) -> Result<CityInputs> {
        let samples = store.readings_between(window).await?;
        let series = HistoricalSeries::from_samples(samples).ok_or(ClairityError::MissingCurrent)?;
        let latest = series.last();

        Ok(CityInputs {
            current: CurrentReading {
                value: latest.pm25,
                time: latest.timestamp,
            },
            forecast: ForecastBlend::default(),
            history: Some(series),
        })
    }
}

/// Fit the trend, blend it with the forecast and build the city's result
fn assemble(name: &str, inputs: CityInputs) -> Result<CityAirQuality> {
    let CityInputs {
        current,
        mut forecast,
        history,
    } = inputs;

    let history = match history {
        Some(series) => {
            let model = TrendModel::fit(&series)?;
            forecast.trend = model.project(forecast.dates.len());
            forecast.combined = blend(&forecast.values, &forecast.trend);
            Some(series.to_points())
        }
        None => {
            forecast.trend = Vec::new();
            forecast.combined = forecast.values.clone();
            None
        }
    };

    Ok(CityAirQuality {
        name: name.to_string(),
        history,
        current,
        forecast,
    })
}
