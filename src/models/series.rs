//! Historical PM2.5 series model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One past PM2.5 observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSample {
    /// Local time of the observation as reported by the source
    pub timestamp: NaiveDateTime,
    /// PM2.5 value
    pub pm25: f64,
}

impl HistoricalSample {
    #[must_use]
    pub fn new(timestamp: NaiveDateTime, pm25: f64) -> Self {
        Self { timestamp, pm25 }
    }
}

/// Non-empty sequence of samples, sorted ascending by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    samples: Vec<HistoricalSample>,
}

/// Serialized form of one sample, including its day offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDateTime,
    pub pm25: f64,
    pub days_since: i64,
}

impl HistoricalSeries {
    /// Build a series from unordered samples.
    ///
    /// Returns `None` for an empty input so callers never see an empty series.
    #[must_use]
    pub fn from_samples(mut samples: Vec<HistoricalSample>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by_key(|sample| sample.timestamp);
        Some(Self { samples })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Never true: an empty series cannot be built
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> &HistoricalSample {
        &self.samples[0]
    }

    #[must_use]
    pub fn last(&self) -> &HistoricalSample {
        &self.samples[self.samples.len() - 1]
    }

    /// Whole days between each sample and the earliest one, in series order
    #[must_use]
    pub fn day_offsets(&self) -> Vec<i64> {
        let start = self.first().timestamp;
        self.samples
            .iter()
            .map(|sample| (sample.timestamp - start).num_days())
            .collect()
    }

    /// PM2.5 values in series order
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.pm25).collect()
    }

    #[must_use]
    pub fn to_points(&self) -> Vec<HistoryPoint> {
        self.samples
            .iter()
            .zip(self.day_offsets())
            .map(|(sample, days_since)| HistoryPoint {
                date: sample.timestamp,
                pm25: sample.pm25,
                days_since,
            })
            .collect()
    }
}
