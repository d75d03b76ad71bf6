//! Per-city report returned by the aggregate endpoint

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::HistoryPoint;

/// Daily forecast average from the feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastEntry {
    pub day: NaiveDate,
    pub avg: f64,
}

/// Latest observation for a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentReading {
    pub value: f64,
    pub time: NaiveDateTime,
}

/// Forecast values together with the trend projection and the blend of both.
///
/// `trend` and `combined` are either empty or as long as `dates`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastBlend {
    pub dates: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub trend: Vec<f64>,
    pub combined: Vec<f64>,
}

impl ForecastBlend {
    /// Split feed entries into parallel date/value columns
    #[must_use]
    pub fn from_entries(entries: &[ForecastEntry]) -> Self {
        Self {
            dates: entries
                .iter()
                .map(|entry| entry.day.and_time(chrono::NaiveTime::MIN))
                .collect(),
            values: entries.iter().map(|entry| entry.avg).collect(),
            trend: Vec::new(),
            combined: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityAirQuality {
    pub name: String,
    pub history: Option<Vec<HistoryPoint>>,
    pub current: CurrentReading,
    pub forecast: ForecastBlend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityFailure {
    pub name: String,
    pub error: String,
}

/// Entry for one city: a full result or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CityReport {
    Ready(CityAirQuality),
    Failed(CityFailure),
}

impl CityReport {
    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed(CityFailure {
            name: name.into(),
            error: error.into(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(ready) => &ready.name,
            Self::Failed(failed) => &failed.name,
        }
    }

    /// Copy of this report shown under another display name
    #[must_use]
    pub fn renamed(&self, name: &str) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::Ready(ready) => ready.name = name.to_string(),
            Self::Failed(failed) => failed.name = name.to_string(),
        }
        copy
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Failed(failed) => Some(&failed.error),
        }
    }
}

/// City key to report, serialized as a JSON object with sorted keys
pub type AirQualityReport = BTreeMap<String, CityReport>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(name: &str) -> CityReport {
        let time = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        CityReport::Ready(CityAirQuality {
            name: name.to_string(),
            history: None,
            current: CurrentReading { value: 42.0, time },
            forecast: ForecastBlend::from_entries(&[ForecastEntry {
                day: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
                avg: 40.0,
            }]),
        })
    }

    #[test]
    fn test_renamed_keeps_everything_but_the_name() {
        let original = ready("Guadalajara");
        let copy = original.renamed("Zapopan");

        assert_eq!(copy.name(), "Zapopan");
        match (&original, &copy) {
            (CityReport::Ready(a), CityReport::Ready(b)) => {
                assert_eq!(a.current, b.current);
                assert_eq!(a.forecast, b.forecast);
                assert_eq!(a.history, b.history);
            }
            _ => panic!("expected ready reports"),
        }
        assert_eq!(original.name(), "Guadalajara");
    }

    #[test]
    fn test_failure_serializes_flat() {
        let json = serde_json::to_value(CityReport::failed("Monterrey", "HTTP 500")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "Monterrey", "error": "HTTP 500" })
        );
    }

    #[test]
    fn test_ready_serializes_null_history_and_midnight_dates() {
        let json = serde_json::to_value(ready("Monterrey")).unwrap();
        assert!(json["history"].is_null());
        assert!(json.get("error").is_none());
        assert_eq!(json["current"]["time"], "2024-01-05T14:00:00");
        assert_eq!(json["forecast"]["dates"][0], "2024-01-06T00:00:00");
    }
}
