//! SQLite-backed aggregate store.
//!
//! [`AggregateStore::upsert`] is the only write path. It serializes callers
//! per (device, day) with an in-process async mutex, reads the current row,
//! hands it to the caller's merge and writes the result back with a single
//! `INSERT .. ON CONFLICT DO UPDATE` statement. Callers on different keys take
//! different mutexes and only meet at SQLite's own write lock.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use dashmap::DashMap;
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{AggregateRow, LocationRow, RecordKey, RecordsQuery};
use crate::Config;

// ---

/// Special `DATABASE_PATH` value selecting a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

const UPSERT_SQL: &str = r#"
INSERT INTO records (
    device_id, day,
    steps, avg_steps, steps_count,
    heartrate, avg_heartrate, peak_heartrate, heartrate_count,
    oxygen, avg_oxygen, oxygen_count,
    humidity, avg_humidity, humidity_count,
    temperature, avg_temperature, temperature_count,
    co2, avg_co2, co2_count,
    lat, lon, emergency,
    band_records_inserted, room_records_inserted
) VALUES (
    ?, ?,
    ?, ?, ?,
    ?, ?, ?, ?,
    ?, ?, ?,
    ?, ?, ?,
    ?, ?, ?,
    ?, ?, ?,
    ?, ?, ?,
    ?, ?
)
ON CONFLICT (device_id, day) DO UPDATE SET
    steps                 = excluded.steps,
    avg_steps             = excluded.avg_steps,
    steps_count           = excluded.steps_count,
    heartrate             = excluded.heartrate,
    avg_heartrate         = excluded.avg_heartrate,
    peak_heartrate        = excluded.peak_heartrate,
    heartrate_count       = excluded.heartrate_count,
    oxygen                = excluded.oxygen,
    avg_oxygen            = excluded.avg_oxygen,
    oxygen_count          = excluded.oxygen_count,
    humidity              = excluded.humidity,
    avg_humidity          = excluded.avg_humidity,
    humidity_count        = excluded.humidity_count,
    temperature           = excluded.temperature,
    avg_temperature       = excluded.avg_temperature,
    temperature_count     = excluded.temperature_count,
    co2                   = excluded.co2,
    avg_co2               = excluded.avg_co2,
    co2_count             = excluded.co2_count,
    lat                   = excluded.lat,
    lon                   = excluded.lon,
    emergency             = excluded.emergency,
    band_records_inserted = excluded.band_records_inserted,
    room_records_inserted = excluded.room_records_inserted
"#;

/// Existence and size of the file behind the store, served by `GET /debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackingFile {
    pub exists: bool,
    pub size: u64,
}

type LockMap = DashMap<RecordKey, Arc<Mutex<()>>>;

/// A caller's share of one key's mutex.
///
/// Dropping it removes the map entry once no other caller holds the mutex.
/// Runs on every exit path, including a cancelled upsert future.
struct KeyLock<'a> {
    locks: &'a LockMap,
    key: &'a RecordKey,
    mutex: Arc<Mutex<()>>,
}

impl<'a> KeyLock<'a> {
    fn acquire(locks: &'a LockMap, key: &'a RecordKey) -> Self {
        let mutex = locks.entry(key.clone()).or_default().clone();
        KeyLock { locks, key, mutex }
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // Two strong refs left means only the map and this guard hold it.
        self.locks
            .remove_if(self.key, |_, entry| Arc::strong_count(entry) == 2);
    }
}

#[derive(Clone)]
pub struct AggregateStore {
    // ---
    pool: SqlitePool,
    path: Option<PathBuf>,
    locks: Arc<LockMap>,
}

impl AggregateStore {
    // ---
    /// Open (creating if missing) the SQLite file at `path`.
    pub async fn connect(path: impl AsRef<Path>, max_connections: u32) -> anyhow::Result<Self> {
        // ---
        let path_buf = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path_buf)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                anyhow::anyhow!("Failed to open database '{}': {}", path_buf.display(), e)
            })?;

        Ok(Self::with_pool(pool, Some(path_buf)))
    }

    /// Private in-memory database.
    ///
    /// Pinned to one connection that never expires, since every SQLite
    /// connection to `:memory:` gets its own empty database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        // ---
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::with_pool(pool, None))
    }

    pub async fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        // ---
        if cfg.db_path == MEMORY_PATH {
            Self::in_memory().await
        } else {
            Self::connect(&cfg.db_path, cfg.db_pool_max).await
        }
    }

    fn with_pool(pool: SqlitePool, path: Option<PathBuf>) -> Self {
        AggregateStore {
            pool,
            path,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn fetch(&self, key: &RecordKey) -> Result<Option<AggregateRow>> {
        // ---
        let row = sqlx::query_as::<_, AggregateRow>(
            "SELECT * FROM records WHERE device_id = ? AND day = ?",
        )
        .bind(&key.device_id)
        .bind(&key.day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Atomically read-modify-write the row for `key`.
    ///
    /// `mutate` receives the current row (`None` if the key is new) and
    /// returns the row to persist. If `mutate` fails nothing is written.
    pub async fn upsert<F>(&self, key: &RecordKey, mutate: F) -> Result<AggregateRow>
    where
        F: FnOnce(Option<AggregateRow>) -> Result<AggregateRow>,
    {
        // ---
        let entry = KeyLock::acquire(&self.locks, key);
        let _guard = entry.mutex.lock().await;

        self.read_merge_write(key, mutate).await
    }

    async fn read_merge_write<F>(&self, key: &RecordKey, mutate: F) -> Result<AggregateRow>
    where
        F: FnOnce(Option<AggregateRow>) -> Result<AggregateRow>,
    {
        // ---
        let existing = self.fetch(key).await?;
        debug!("Upsert {} (existing row: {})", key, existing.is_some());

        let row = mutate(existing)?;
        if row.key() != *key {
            return Err(Error::KeyMismatch {
                expected: key.clone(),
                found: row.key(),
            });
        }

        self.write(&row).await?;
        Ok(row)
    }

    async fn write(&self, row: &AggregateRow) -> Result<()> {
        // ---
        sqlx::query(UPSERT_SQL)
            .bind(&row.device_id)
            .bind(&row.day)
            .bind(row.steps)
            .bind(row.avg_steps)
            .bind(row.steps_count)
            .bind(row.heartrate)
            .bind(row.avg_heartrate)
            .bind(row.peak_heartrate)
            .bind(row.heartrate_count)
            .bind(row.oxygen)
            .bind(row.avg_oxygen)
            .bind(row.oxygen_count)
            .bind(row.humidity)
            .bind(row.avg_humidity)
            .bind(row.humidity_count)
            .bind(row.temperature)
            .bind(row.avg_temperature)
            .bind(row.temperature_count)
            .bind(row.co2)
            .bind(row.avg_co2)
            .bind(row.co2_count)
            .bind(row.lat)
            .bind(row.lon)
            .bind(row.emergency)
            .bind(row.band_records_inserted)
            .bind(row.room_records_inserted)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Every row, ordered by (device, day).
    pub async fn scan_all(&self) -> Result<Vec<AggregateRow>> {
        // ---
        let rows =
            sqlx::query_as::<_, AggregateRow>("SELECT * FROM records ORDER BY device_id, day")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    /// Rows matching the optional device/day filters, capped at `limit`.
    pub async fn query(&self, params: &RecordsQuery) -> Result<Vec<AggregateRow>> {
        // ---
        let rows = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT * FROM records
            WHERE (?1 IS NULL OR device_id = ?1)
              AND (?2 IS NULL OR day = ?2)
            ORDER BY device_id, day
            LIMIT ?3
            "#,
        )
        .bind(&params.device_id)
        .bind(&params.day)
        .bind(i64::from(params.limit()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Latest known position per (device, day) for rows that have one.
    pub async fn locations(&self, params: &RecordsQuery) -> Result<Vec<LocationRow>> {
        // ---
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT device_id, day, lat, lon FROM records
            WHERE lat IS NOT NULL
              AND (?1 IS NULL OR device_id = ?1)
              AND (?2 IS NULL OR day = ?2)
            ORDER BY device_id, day
            LIMIT ?3
            "#,
        )
        .bind(&params.device_id)
        .bind(&params.day)
        .bind(i64::from(params.limit()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn backing_file(&self) -> BackingFile {
        // ---
        let Some(path) = &self.path else {
            return BackingFile {
                exists: false,
                size: 0,
            };
        };

        match tokio::fs::metadata(path).await {
            Ok(meta) => BackingFile {
                exists: true,
                size: meta.len(),
            },
            Err(_) => BackingFile {
                exists: false,
                size: 0,
            },
        }
    }
}
