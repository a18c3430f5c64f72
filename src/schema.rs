//! Database schema management for `vitals-sensorflow`.
//!
//! Ensures the aggregate table and its indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create the schema (idempotent).
///
/// `records` holds one row per (device, day). The composite primary key is
/// the uniqueness constraint the upsert relies on. Safe to call on every
/// startup; no-op if objects already exist.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            device_id             TEXT    NOT NULL,
            day                   TEXT    NOT NULL,

            steps                 INTEGER,
            avg_steps             REAL,
            steps_count           INTEGER NOT NULL DEFAULT 0,

            heartrate             REAL,
            avg_heartrate         REAL,
            peak_heartrate        REAL,
            heartrate_count       INTEGER NOT NULL DEFAULT 0,

            oxygen                REAL,
            avg_oxygen            REAL,
            oxygen_count          INTEGER NOT NULL DEFAULT 0,

            humidity              REAL,
            avg_humidity          REAL,
            humidity_count        INTEGER NOT NULL DEFAULT 0,

            temperature           REAL,
            avg_temperature       REAL,
            temperature_count     INTEGER NOT NULL DEFAULT 0,

            co2                   INTEGER,
            avg_co2               REAL,
            co2_count             INTEGER NOT NULL DEFAULT 0,

            lat                   REAL,
            lon                   REAL,
            emergency             INTEGER,

            band_records_inserted INTEGER NOT NULL DEFAULT 0,
            room_records_inserted INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (device_id, day)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_records_day
            ON records (day);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
