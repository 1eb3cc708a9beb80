//! Health ledger persistence
//!
//! The ledger is a keyed record store (URL -> health record) that outlives a
//! single run. A missing database is a first run and yields an empty ledger;
//! records for URLs no longer listed anywhere are kept unless the retention
//! window purges them.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::models::HealthRecord;

/// Durable storage for health records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Every stored record
    async fn load(&self) -> LedgerResult<Vec<HealthRecord>>;

    /// Insert or replace the given records in one transaction
    async fn save(&self, records: &[HealthRecord]) -> LedgerResult<usize>;

    /// Delete records whose last probe is older than `cutoff` (Unix seconds)
    async fn purge_older_than(&self, cutoff: i64) -> LedgerResult<u64>;
}

/// SQLite-backed ledger store
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: Pool<Sqlite>,
}

impl SqliteLedgerStore {
    /// Open (creating when missing) and migrate the store
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| LedgerError::ConnectionFailed {
                message: format!("invalid ledger url {}: {e}", config.database_url),
            })?
            .create_if_missing(true);

        // every connection to an in-memory database is a separate database
        let max_connections = if config.database_url.contains(":memory:") {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::ConnectionFailed {
                message: format!("{}: {e}", config.database_url),
            })?;

        let store = Self { pool };
        store.migrate().await?;
        debug!("Opened health ledger at {}", config.database_url);
        Ok(store)
    }

    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS health_records (
                url TEXT PRIMARY KEY NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0,
                average_latency REAL NOT NULL DEFAULT 0,
                average_bitrate REAL NOT NULL DEFAULT 0,
                last_success_timestamp INTEGER NOT NULL DEFAULT 0,
                last_probe_timestamp INTEGER NOT NULL DEFAULT 0,
                consecutive_failures INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_health_records_last_probe ON health_records (last_probe_timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn count(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    Ok(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
}

fn record_from_row(row: &SqliteRow) -> Result<HealthRecord, sqlx::Error> {
    Ok(HealthRecord {
        url: row.try_get("url")?,
        success_count: count(row, "success_count")?,
        fail_count: count(row, "fail_count")?,
        average_latency: row.try_get("average_latency")?,
        average_bitrate: row.try_get("average_bitrate")?,
        last_success_timestamp: row.try_get("last_success_timestamp")?,
        last_probe_timestamp: row.try_get("last_probe_timestamp")?,
        consecutive_failures: count(row, "consecutive_failures")?,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self) -> LedgerResult<Vec<HealthRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT url, success_count, fail_count, average_latency, average_bitrate,
                   last_success_timestamp, last_probe_timestamp, consecutive_failures
            FROM health_records
            ORDER BY url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Loaded {} health records from store", records.len());
        Ok(records)
    }

    async fn save(&self, records: &[HealthRecord]) -> LedgerResult<usize> {
        let mut transaction = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO health_records (
                    url, success_count, fail_count, average_latency, average_bitrate,
                    last_success_timestamp, last_probe_timestamp, consecutive_failures
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    success_count = excluded.success_count,
                    fail_count = excluded.fail_count,
                    average_latency = excluded.average_latency,
                    average_bitrate = excluded.average_bitrate,
                    last_success_timestamp = excluded.last_success_timestamp,
                    last_probe_timestamp = excluded.last_probe_timestamp,
                    consecutive_failures = excluded.consecutive_failures
                "#,
            )
            .bind(&record.url)
            .bind(record.success_count as i64)
            .bind(record.fail_count as i64)
            .bind(record.average_latency)
            .bind(record.average_bitrate)
            .bind(record.last_success_timestamp)
            .bind(record.last_probe_timestamp)
            .bind(record.consecutive_failures as i64)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        info!("Persisted {} health records", records.len());
        Ok(records.len())
    }

    async fn purge_older_than(&self, cutoff: i64) -> LedgerResult<u64> {
        let result = sqlx::query("DELETE FROM health_records WHERE last_probe_timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Process-local store, for dry runs and tests
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    records: Arc<Mutex<Vec<HealthRecord>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> LedgerResult<Vec<HealthRecord>> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &[HealthRecord]) -> LedgerResult<usize> {
        let mut stored = self.records.lock().await;
        for record in records {
            match stored.iter_mut().find(|r| r.url == record.url) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn purge_older_than(&self, cutoff: i64) -> LedgerResult<u64> {
        let mut stored = self.records.lock().await;
        let before = stored.len();
        stored.retain(|r| r.last_probe_timestamp >= cutoff);
        Ok((before - stored.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> LedgerConfig {
        LedgerConfig {
            database_url: "sqlite::memory:".to_string(),
            ..LedgerConfig::default()
        }
    }

    fn record(url: &str, last_probe: i64) -> HealthRecord {
        HealthRecord {
            success_count: 3,
            fail_count: 1,
            average_latency: 0.42,
            average_bitrate: 2100.0,
            last_success_timestamp: last_probe - 10,
            last_probe_timestamp: last_probe,
            consecutive_failures: 1,
            ..HealthRecord::new(url)
        }
    }

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = SqliteLedgerStore::connect(&memory_config()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_upserts_and_loads() {
        let store = SqliteLedgerStore::connect(&memory_config()).await.unwrap();
        store.save(&[record("http://b", 100), record("http://a", 200)]).await.unwrap();

        let mut updated = record("http://b", 300);
        updated.consecutive_failures = 0;
        updated.success_count = 4;
        store.save(&[updated.clone()]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], record("http://a", 200));
        assert_eq!(loaded[1], updated);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            database_url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
            ..LedgerConfig::default()
        };

        {
            let store = SqliteLedgerStore::connect(&config).await.unwrap();
            store.save(&[record("http://a", 100)]).await.unwrap();
        }

        let reopened = SqliteLedgerStore::connect(&config).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), vec![record("http://a", 100)]);
    }

    #[tokio::test]
    async fn test_purge_respects_cutoff() {
        let store = SqliteLedgerStore::connect(&memory_config()).await.unwrap();
        store
            .save(&[record("http://old", 100), record("http://new", 1000)])
            .await
            .unwrap();
        assert_eq!(store.purge_older_than(500).await.unwrap(), 1);
        let urls: Vec<String> = store.load().await.unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://new"]);

        let memory = MemoryLedgerStore::new();
        memory.save(&[record("http://old", 100)]).await.unwrap();
        assert_eq!(memory.purge_older_than(500).await.unwrap(), 1);
        assert!(memory.load().await.unwrap().is_empty());
    }
}
