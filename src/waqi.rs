//! WAQI (World Air Quality Index) API client
//!
//! Implements both [`AirQualityFeed`] (station feed with current reading and
//! daily forecast) and [`HistorySource`] (timeseries endpoint). Requests go
//! through a middleware client with a fixed timeout and optional retries of
//! transient failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tracing::{debug, instrument, warn};

use crate::config::WaqiConfig;
use crate::feed::{AirQualityFeed, StationSnapshot};
use crate::history::{HistorySource, LookbackWindow};
use crate::models::HistoricalSeries;
use crate::{ClairityError, Result};

pub struct WaqiClient {
    client: ClientWithMiddleware,
    token: String,
    feed_base_url: String,
    timeseries_base_url: String,
}

impl WaqiClient {
    /// Create a new client from the WAQI configuration section
    pub fn new(config: &WaqiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("Clairity/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            token: config.token.clone(),
            feed_base_url: config.feed_base_url.trim_end_matches('/').to_string(),
            timeseries_base_url: config.timeseries_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn feed_url(&self, station_code: &str) -> String {
        format!("{}/{}/?token={}", self.feed_base_url, station_code, self.token)
    }

    fn timeseries_url(&self, station_id: &str, window: &LookbackWindow) -> String {
        format!(
            "{}/{}/?token={}&start={}&end={}",
            self.timeseries_base_url,
            station_id,
            self.token,
            window.start_date(),
            window.end_date()
        )
    }

    async fn get_body(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClairityError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl AirQualityFeed for WaqiClient {
    #[instrument(skip(self))]
    async fn station_snapshot(&self, station_code: &str) -> Result<StationSnapshot> {
        debug!("Requesting WAQI feed");
        let body = self.get_body(&self.feed_url(station_code)).await?;
        let snapshot = wire::parse_snapshot(&body)?;
        debug!(
            station_id = %snapshot.station_id,
            forecast_days = snapshot.forecast.len(),
            "Parsed WAQI feed"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl HistorySource for WaqiClient {
    #[instrument(skip(self, window), fields(start = %window.start_date(), end = %window.end_date()))]
    async fn fetch_history(
        &self,
        station_id: &str,
        window: &LookbackWindow,
    ) -> Option<HistoricalSeries> {
        let body = match self.get_body(&self.timeseries_url(station_id, window)).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Historical data request failed: {}", e);
                return None;
            }
        };

        match wire::parse_timeseries(&body) {
            Ok(series) => series,
            Err(e) => {
                warn!("Historical data could not be parsed: {}", e);
                None
            }
        }
    }
}

/// WAQI response structures and conversion utilities
mod wire {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::Deserialize;
    use serde_json::Value;
    use tracing::debug;

    use crate::feed::StationSnapshot;
    use crate::models::{CurrentReading, ForecastEntry, HistoricalSample, HistoricalSeries};
    use crate::{ClairityError, Result};

    const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const DAY_FORMAT: &str = "%Y-%m-%d";

    /// Every WAQI response wraps its payload as `{status, data}`
    #[derive(Debug, Deserialize)]
    struct Envelope {
        status: Option<String>,
        #[serde(default)]
        data: Value,
    }

    #[derive(Debug, Deserialize)]
    struct StationData {
        idx: Option<StationIdx>,
        iaqi: Option<Iaqi>,
        time: Option<ObservationTime>,
        forecast: Option<Forecast>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum StationIdx {
        Number(i64),
        Text(String),
    }

    #[derive(Debug, Deserialize)]
    struct Iaqi {
        pm25: Option<Measurement>,
    }

    #[derive(Debug, Deserialize)]
    struct Measurement {
        v: Option<Value>,
    }

    #[derive(Debug, Deserialize)]
    struct ObservationTime {
        s: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Forecast {
        daily: Option<DailyForecast>,
    }

    #[derive(Debug, Deserialize)]
    struct DailyForecast {
        pm25: Option<Vec<DailyValue>>,
    }

    #[derive(Debug, Deserialize)]
    struct DailyValue {
        day: String,
        avg: Value,
    }

    /// One element of the timeseries `data` list
    #[derive(Debug, Deserialize)]
    struct TimeseriesRecord {
        time: ObservationTime,
        iaqi: Iaqi,
    }

    /// Numeric readings arrive as numbers, occasionally as numeric strings
    fn numeric(value: &Value) -> Option<f64> {
        match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn parse_time(text: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, TIME_FORMAT)
            .map_err(|e| ClairityError::parse(format!("invalid timestamp '{text}': {e}")))
    }

    fn open_envelope(body: &str) -> Result<Value> {
        let envelope: Envelope = serde_json::from_str(body)?;
        match envelope.status.as_deref() {
            None | Some("ok") => Ok(envelope.data),
            Some(status) => {
                let message = match envelope.data {
                    Value::String(message) => message,
                    Value::Null => status.to_string(),
                    other => other.to_string(),
                };
                Err(ClairityError::upstream(message))
            }
        }
    }

    pub(super) fn parse_snapshot(body: &str) -> Result<StationSnapshot> {
        let data: StationData = serde_json::from_value(open_envelope(body)?)?;

        let station_id = match data.idx {
            Some(StationIdx::Number(idx)) => idx.to_string(),
            Some(StationIdx::Text(idx)) => idx,
            None => return Err(ClairityError::parse("feed response has no station index")),
        };

        let raw_value = data
            .iaqi
            .and_then(|iaqi| iaqi.pm25)
            .and_then(|pm25| pm25.v)
            .ok_or(ClairityError::MissingCurrent)?;
        let value = numeric(&raw_value)
            .ok_or_else(|| ClairityError::parse(format!("invalid current PM2.5 value {raw_value}")))?;
        let time_text = data
            .time
            .and_then(|time| time.s)
            .ok_or_else(|| ClairityError::parse("feed response has no observation time"))?;
        let current = CurrentReading {
            value,
            time: parse_time(&time_text)?,
        };

        let forecast = data
            .forecast
            .and_then(|forecast| forecast.daily)
            .and_then(|daily| daily.pm25)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| -> Result<ForecastEntry> {
                let day = NaiveDate::parse_from_str(&entry.day, DAY_FORMAT).map_err(|e| {
                    ClairityError::parse(format!("invalid forecast day '{}': {e}", entry.day))
                })?;
                let avg = numeric(&entry.avg).ok_or_else(|| {
                    ClairityError::parse(format!("invalid forecast average for {day}"))
                })?;
                Ok(ForecastEntry { day, avg })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StationSnapshot {
            station_id,
            current,
            forecast,
        })
    }

    /// Parse a timeseries payload, skipping records that are incomplete.
    ///
    /// `Ok(None)` means the payload was readable but held no valid sample.
    pub(super) fn parse_timeseries(body: &str) -> Result<Option<HistoricalSeries>> {
        let Value::Array(records) = open_envelope(body)? else {
            return Err(ClairityError::parse("timeseries data is not a list"));
        };

        let total = records.len();
        let samples: Vec<HistoricalSample> = records
            .into_iter()
            .filter_map(|record| {
                let record: TimeseriesRecord = serde_json::from_value(record).ok()?;
                let timestamp = parse_time(record.time.s.as_deref()?).ok()?;
                let pm25 = numeric(record.iaqi.pm25?.v.as_ref()?)?;
                Some(HistoricalSample::new(timestamp, pm25))
            })
            .collect();

        debug!("Kept {} of {} historical records", samples.len(), total);
        Ok(HistoricalSeries::from_samples(samples))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        fn feed_body(data: Value) -> String {
            json!({ "status": "ok", "data": data }).to_string()
        }

        #[test]
        fn test_parse_snapshot_with_forecast() {
            let body = feed_body(json!({
                "idx": 5527,
                "iaqi": { "pm25": { "v": 57 }, "o3": { "v": 12.3 } },
                "time": { "s": "2024-01-05 14:00:00", "tz": "-06:00" },
                "forecast": { "daily": { "pm25": [
                    { "day": "2024-01-06", "avg": 50, "max": 70, "min": 30 },
                    { "day": "2024-01-07", "avg": 61.5, "max": 80, "min": 40 }
                ] } }
            }));

            let snapshot = parse_snapshot(&body).unwrap();
            assert_eq!(snapshot.station_id, "5527");
            assert_eq!(snapshot.current.value, 57.0);
            assert_eq!(
                snapshot.current.time,
                parse_time("2024-01-05 14:00:00").unwrap()
            );
            assert_eq!(snapshot.forecast.len(), 2);
            assert_eq!(snapshot.forecast[1].avg, 61.5);
            assert_eq!(
                snapshot.forecast[0].day,
                NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
            );
        }

        #[test]
        fn test_missing_forecast_is_empty() {
            let body = feed_body(json!({
                "idx": 1,
                "iaqi": { "pm25": { "v": "33" } },
                "time": { "s": "2024-01-05 14:00:00" }
            }));

            let snapshot = parse_snapshot(&body).unwrap();
            assert_eq!(snapshot.current.value, 33.0);
            assert!(snapshot.forecast.is_empty());
        }

        #[test]
        fn test_missing_current_pm25_is_reported() {
            let body = feed_body(json!({
                "idx": 1,
                "iaqi": { "no2": { "v": 8 } },
                "time": { "s": "2024-01-05 14:00:00" }
            }));

            assert!(matches!(
                parse_snapshot(&body),
                Err(ClairityError::MissingCurrent)
            ));
        }

        #[test]
        fn test_error_envelope_carries_upstream_message() {
            let body = json!({ "status": "error", "data": "Unknown station" }).to_string();
            let err = parse_snapshot(&body).unwrap_err();
            assert!(matches!(err, ClairityError::Upstream { .. }));
            assert!(err.to_string().contains("Unknown station"));
        }

        #[test]
        fn test_bad_forecast_day_fails_the_snapshot() {
            let body = feed_body(json!({
                "idx": 1,
                "iaqi": { "pm25": { "v": 20 } },
                "time": { "s": "2024-01-05 14:00:00" },
                "forecast": { "daily": { "pm25": [ { "day": "06/01/2024", "avg": 50 } ] } }
            }));

            assert!(matches!(
                parse_snapshot(&body),
                Err(ClairityError::Parse { .. })
            ));
        }

        #[test]
        fn test_timeseries_is_sorted() {
            let body = feed_body(json!([
                { "time": { "s": "2024-01-03 00:00:00" }, "iaqi": { "pm25": { "v": 30 } } },
                { "time": { "s": "2024-01-01 00:00:00" }, "iaqi": { "pm25": { "v": 10 } } },
                { "time": { "s": "2024-01-02 00:00:00" }, "iaqi": { "pm25": { "v": 20 } } }
            ]));

            let series = parse_timeseries(&body).unwrap().unwrap();
            assert_eq!(series.values(), vec![10.0, 20.0, 30.0]);
            assert_eq!(series.day_offsets(), vec![0, 1, 2]);
        }

        #[test]
        fn test_malformed_records_are_skipped() {
            let body = feed_body(json!([
                { "time": { "s": "2024-01-01 00:00:00" }, "iaqi": { "pm25": { "v": 10 } } },
                { "time": { "s": "2024-01-02 00:00:00" }, "iaqi": { "pm10": { "v": 40 } } },
                { "time": { "s": "not a time" }, "iaqi": { "pm25": { "v": 11 } } },
                { "iaqi": { "pm25": { "v": 12 } } },
                "garbage"
            ]));

            let series = parse_timeseries(&body).unwrap().unwrap();
            assert_eq!(series.len(), 1);
            assert_eq!(series.values(), vec![10.0]);
        }

        #[test]
        fn test_timeseries_without_valid_records_is_absent() {
            let body = feed_body(json!([
                { "time": { "s": "2024-01-02 00:00:00" }, "iaqi": {} }
            ]));
            assert!(parse_timeseries(&body).unwrap().is_none());
        }

        #[test]
        fn test_timeseries_requires_a_list() {
            let body = feed_body(json!({ "records": [] }));
            assert!(parse_timeseries(&body).is_err());
        }
    }
}
