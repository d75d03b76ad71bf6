//! Historical series retrieval
//!
//! A [`HistorySource`] turns a station identifier and a lookback window into a
//! sorted [`HistoricalSeries`], or reports that nothing usable was found.
//! Implementations swallow their own failures: callers only ever see `None`.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::HistoricalSeries;

/// Time range `[start, end]` covered by a history query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LookbackWindow {
    /// Window of `days` days ending at `now`
    #[must_use]
    pub fn ending_at(now: NaiveDateTime, days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    #[must_use]
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Past PM2.5 readings for `station_id` inside `window`.
    ///
    /// Returns `None` when the source is unreachable, answers with an error or
    /// holds no valid record.
    async fn fetch_history(
        &self,
        station_id: &str,
        window: &LookbackWindow,
    ) -> Option<HistoricalSeries>;
}
