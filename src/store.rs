//! Read access to the local sensor store
//!
//! The store holds timestamped AQI readings for a single city and acts as an
//! alternate history provider for it. Records live in the `sensordatas`
//! keyspace of a fjall database, keyed by their timestamp so that range scans
//! come back in chronological order.
//!
//! fjall locks its directory while a database is open, so the store has a
//! single writer at a time. The server only reads; readings are loaded with
//! the `clairity-ingest` binary while the server is stopped.

use std::fmt::Display;
use std::fs;
use std::io::BufRead;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use fjall::{Database, Keyspace, PersistMode};
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::history::LookbackWindow;
use crate::models::HistoricalSample;
use crate::{ClairityError, Result};

const KEYSPACE: &str = "sensordatas";

#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Readings with a timestamp inside `window`, oldest first
    async fn readings_between(&self, window: &LookbackWindow) -> Result<Vec<HistoricalSample>>;
}

#[derive(Serialize, Deserialize)]
struct StoredReading {
    aqi: f64,
}

/// One line of an import file, e.g. `{"timestamp":"2024-04-01T08:00:00","aqi":52.0}`
#[derive(Debug, Deserialize)]
struct ImportRecord {
    timestamp: NaiveDateTime,
    aqi: f64,
}

pub struct FjallSensorStore {
    db: Database,
    readings: Keyspace,
}

impl std::fmt::Debug for FjallSensorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FjallSensorStore").finish_non_exhaustive()
    }
}

fn store_error(err: impl Display) -> ClairityError {
    ClairityError::store(err.to_string())
}

/// Timestamps are stored as naive wall-clock time, encoded as if UTC
fn encode_key(timestamp: NaiveDateTime) -> Result<[u8; 8]> {
    let millis = u64::try_from(timestamp.and_utc().timestamp_millis())
        .map_err(|_| ClairityError::store(format!("timestamp {timestamp} predates the epoch")))?;
    Ok(millis.to_be_bytes())
}

fn decode_key(key: &[u8]) -> Result<NaiveDateTime> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| ClairityError::store(format!("unexpected key length {}", key.len())))?;
    let millis = i64::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| ClairityError::store("timestamp key out of range"))?;
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| ClairityError::store("timestamp key out of range"))
}

fn scan(readings: &Keyspace, start: [u8; 8], end: [u8; 8]) -> Result<Vec<HistoricalSample>> {
    let mut samples = Vec::new();
    for item in readings.range(start..=end) {
        let (key, value) = item.into_inner().map_err(store_error)?;
        let stored: StoredReading = postcard::from_bytes(&value)?;
        samples.push(HistoricalSample::new(decode_key(&key)?, stored.aqi));
    }
    Ok(samples)
}

impl FjallSensorStore {
    /// Open an existing store at `path`.
    ///
    /// A missing or empty directory is an error rather than a fresh database,
    /// so a mistyped path fails at startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let populated = fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if !populated {
            return Err(ClairityError::store(format!(
                "no sensor store at {}",
                path.display()
            )));
        }
        Self::create(path)
    }

    /// Open the store at `path`, creating it if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path.as_ref())
            .open()
            .map_err(store_error)?;
        let readings = db
            .keyspace(KEYSPACE, fjall::KeyspaceCreateOptions::default)
            .map_err(store_error)?;
        Ok(Self { db, readings })
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.readings.is_empty().map_err(store_error)
    }

    /// Write one reading
    pub fn insert(&self, timestamp: NaiveDateTime, aqi: f64) -> Result<()> {
        let bytes = postcard::to_stdvec(&StoredReading { aqi })?;
        self.readings
            .insert(encode_key(timestamp)?.to_vec(), bytes)
            .map_err(store_error)?;
        Ok(())
    }

    /// Import JSON lines of `{timestamp, aqi}` and sync them to disk.
    ///
    /// Blank lines are skipped. Returns the number of readings written.
    pub fn import(&self, input: impl BufRead) -> Result<usize> {
        let mut count = 0;
        for (index, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ImportRecord = serde_json::from_str(&line)
                .map_err(|e| ClairityError::parse(format!("line {}: {e}", index + 1)))?;
            self.insert(record.timestamp, record.aqi)?;
            count += 1;
        }
        self.db.persist(PersistMode::SyncAll).map_err(store_error)?;
        Ok(count)
    }
}

#[async_trait]
impl SensorStore for FjallSensorStore {
    #[tracing::instrument(name = "query_sensor_store", level = "debug", skip(self))]
    async fn readings_between(&self, window: &LookbackWindow) -> Result<Vec<HistoricalSample>> {
        let readings = self.readings.clone();
        let start = encode_key(window.start)?;
        let end = encode_key(window.end)?;

        let samples = task::spawn_blocking(move || scan(&readings, start, end))
            .await
            .map_err(store_error)??;

        tracing::debug!("Read {} sensor records", samples.len());
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_key_roundtrip_keeps_order() {
        let early = encode_key(at(1, 0)).unwrap();
        let late = encode_key(at(1, 1)).unwrap();
        assert!(early < late);
        assert_eq!(decode_key(&late).unwrap(), at(1, 1));
    }

    #[test]
    fn test_pre_epoch_timestamp_is_rejected() {
        let old = NaiveDate::from_ymd_opt(1960, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(encode_key(old).is_err());
    }

    #[tokio::test]
    async fn test_range_query_is_ordered_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallSensorStore::create(dir.path()).unwrap();

        store.insert(at(10, 12), 80.0).unwrap();
        store.insert(at(2, 8), 40.0).unwrap();
        store.insert(at(5, 9), 55.0).unwrap();
        store.insert(at(20, 0), 99.0).unwrap();

        let window = LookbackWindow {
            start: at(1, 0),
            end: at(10, 12),
        };
        let samples = store.readings_between(&window).await.unwrap();

        let values: Vec<f64> = samples.iter().map(|s| s.pm25).collect();
        assert_eq!(values, vec![40.0, 55.0, 80.0]);
        assert_eq!(samples[0].timestamp, at(2, 8));
    }

    #[tokio::test]
    async fn test_empty_window_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallSensorStore::create(dir.path()).unwrap();
        store.insert(at(2, 8), 40.0).unwrap();

        let window = LookbackWindow::ending_at(at(30, 0), 3);
        assert!(store.readings_between(&window).await.unwrap().is_empty());
        assert!(window.start > at(2, 8) + Duration::days(1));
    }

    #[test]
    fn test_open_rejects_missing_or_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sensors");

        let err = FjallSensorStore::open(&missing).unwrap_err();
        assert!(err.to_string().contains("no sensor store"));
        assert!(!missing.exists());

        let err = FjallSensorStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, ClairityError::Store { .. }));
    }

    #[tokio::test]
    async fn test_imported_readings_are_visible_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let input = concat!(
            "{\"timestamp\":\"2024-04-05T09:00:00\",\"aqi\":55.0}\n",
            "\n",
            "{\"timestamp\":\"2024-04-02T08:00:00\",\"aqi\":40.0}\n",
        );
        {
            let writer = FjallSensorStore::create(dir.path()).unwrap();
            assert!(writer.is_empty().unwrap());
            assert_eq!(writer.import(input.as_bytes()).unwrap(), 2);
        }

        let reader = FjallSensorStore::open(dir.path()).unwrap();
        assert!(!reader.is_empty().unwrap());
        let window = LookbackWindow::ending_at(at(10, 0), 30);
        let samples = reader.readings_between(&window).await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, at(2, 8));
        assert_eq!(samples[1].pm25, 55.0);
    }

    #[test]
    fn test_import_reports_the_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallSensorStore::create(dir.path()).unwrap();
        let input = "{\"timestamp\":\"2024-04-02T08:00:00\",\"aqi\":40.0}\n{\"aqi\":1}\n";

        let err = store.import(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ClairityError::Parse { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_second_open_while_held_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _held = FjallSensorStore::create(dir.path()).unwrap();

        assert!(matches!(
            FjallSensorStore::create(dir.path()),
            Err(ClairityError::Store { .. })
        ));
    }
}
