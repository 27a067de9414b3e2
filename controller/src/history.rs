use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, warn};

use hvac_optimizer_common::{DeviceReading, FanState, HistoryError, HistoryStore, HvacState};

const READINGS_QUERY: &str = "SELECT ip, temp, tTemp, tstate, fstate, timestamp
     FROM scan_data
     WHERE timestamp >= ?1
     ORDER BY ip, timestamp DESC";

/// Read-only view of the scanner's `scan_data` table.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    path: Arc<PathBuf>,
}

struct RawRow {
    ip: String,
    temp: Option<f64>,
    target: Option<f64>,
    tstate: Option<i64>,
    fstate: Option<i64>,
    timestamp_ms: i64,
}

impl SqliteHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    fn load_blocking(path: &Path, since_ms: i64) -> Result<Vec<DeviceReading>, HistoryError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| HistoryError::Unavailable(format!("{}: {err}", path.display())))?;

        let mut stmt = conn
            .prepare(READINGS_QUERY)
            .map_err(|err| HistoryError::Query(err.to_string()))?;

        let rows = stmt
            .query_map(params![since_ms], |row| {
                Ok(RawRow {
                    ip: row.get(0)?,
                    temp: row.get(1)?,
                    target: row.get(2)?,
                    tstate: row.get(3)?,
                    fstate: row.get(4)?,
                    timestamp_ms: row.get(5)?,
                })
            })
            .map_err(|err| HistoryError::Query(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| HistoryError::Query(err.to_string()))?;

        let total = rows.len();
        let readings: Vec<DeviceReading> = rows.into_iter().filter_map(to_reading).collect();
        debug!("loaded {} of {total} history rows", readings.len());
        Ok(readings)
    }
}

fn to_reading(row: RawRow) -> Option<DeviceReading> {
    let Some(current_temp) = row.temp else {
        warn!("skipping reading for {} without temperature", row.ip);
        return None;
    };
    let hvac_state = row.tstate.and_then(HvacState::from_code);
    let fan_state = row.fstate.and_then(FanState::from_code);
    let (Some(hvac_state), Some(fan_state)) = (hvac_state, fan_state) else {
        warn!(
            "skipping reading for {} with unknown state codes tstate={:?} fstate={:?}",
            row.ip, row.tstate, row.fstate
        );
        return None;
    };
    let Some(observed_at) = DateTime::<Utc>::from_timestamp_millis(row.timestamp_ms) else {
        warn!("skipping reading for {} with bad timestamp {}", row.ip, row.timestamp_ms);
        return None;
    };

    Some(DeviceReading {
        device_id: row.ip,
        current_temp,
        target_temp: row.target,
        hvac_state,
        fan_state,
        observed_at,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load_readings(&self, lookback: Duration) -> Result<Vec<DeviceReading>, HistoryError> {
        let lookback_ms: i64 = lookback.as_millis().try_into().unwrap_or(i64::MAX);
        let since_ms = Utc::now().timestamp_millis().saturating_sub(lookback_ms);
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || Self::load_blocking(&path, since_ms))
            .await
            .map_err(|err| HistoryError::Unavailable(format!("history task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "CREATE TABLE scan_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        temp REAL,
        tTemp REAL,
        tstate INTEGER,
        fstate INTEGER
    )";

    fn seed(path: &std::path::Path, rows: &[(&str, i64, Option<f64>, Option<f64>, i64, i64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for (ip, timestamp, temp, target, tstate, fstate) in rows {
            conn.execute(
                "INSERT INTO scan_data (ip, timestamp, temp, tTemp, tstate, fstate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![ip, timestamp, temp, target, tstate, fstate],
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn loads_recent_rows_grouped_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermostat_data.db");
        let now = Utc::now().timestamp_millis();
        let old = now - 8 * 24 * 3_600 * 1_000;
        seed(
            &path,
            &[
                ("10.0.0.2", now - 60_000, Some(77.0), Some(76.0), 0, 0),
                ("10.0.0.1", now - 120_000, Some(79.0), None, 0, 0),
                ("10.0.0.1", now - 60_000, Some(80.0), Some(75.0), 2, 1),
                ("10.0.0.1", old, Some(90.0), Some(75.0), 2, 1),
            ],
        );

        let readings = SqliteHistoryStore::new(&path)
            .load_readings(Duration::from_secs(7 * 24 * 3_600))
            .await
            .unwrap();

        let summary: Vec<_> = readings
            .iter()
            .map(|r| (r.device_id.as_str(), r.current_temp))
            .collect();
        assert_eq!(
            summary,
            vec![("10.0.0.1", 80.0), ("10.0.0.1", 79.0), ("10.0.0.2", 77.0)]
        );
        assert_eq!(readings[0].hvac_state, HvacState::Cool);
        assert_eq!(readings[0].fan_state, FanState::On);
        assert_eq!(readings[0].target_temp, Some(75.0));
        assert_eq!(readings[1].target_temp, None);
    }

    #[tokio::test]
    async fn rows_with_gaps_or_unknown_codes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermostat_data.db");
        let now = Utc::now().timestamp_millis();
        seed(
            &path,
            &[
                ("10.0.0.1", now, None, Some(75.0), 0, 0),
                ("10.0.0.2", now, Some(78.0), Some(75.0), 7, 0),
                ("10.0.0.3", now, Some(78.0), Some(75.0), 1, 0),
            ],
        );

        let readings = SqliteHistoryStore::new(&path)
            .load_readings(Duration::from_secs(3_600))
            .await
            .unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].device_id, "10.0.0.3");
        assert_eq!(readings[0].hvac_state, HvacState::Heat);
    }

    #[tokio::test]
    async fn missing_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();

        let err = SqliteHistoryStore::new(dir.path().join("absent.db"))
            .load_readings(Duration::from_secs(3_600))
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn missing_table_is_a_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE unrelated (id INTEGER)")
            .unwrap();

        let err = SqliteHistoryStore::new(&path)
            .load_readings(Duration::from_secs(3_600))
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::Query(_)));
    }
}
