//! SQLite result store
//!
//! One row per settled composite evaluation in the `calculations` table,
//! keyed by `(user_id, expression_id)`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{NewRecord, PersistableRecord, ResultStore, StoreResult};

/// Result store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Open (or create) the database at `database_url` and ensure the schema
    ///
    /// In-memory URLs get a single long-lived connection, since every
    /// SQLite connection would otherwise see its own empty database.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        info!("Result store ready at {}", database_url);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `calculations` table if it does not exist
    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calculations (
                user_id INTEGER NOT NULL,
                expression_id INTEGER NOT NULL,
                calculation TEXT NOT NULL,
                result REAL NOT NULL,
                status INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, expression_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn hydrate_record(row: SqliteRow) -> StoreResult<PersistableRecord> {
    let status: i64 = row.try_get("status")?;
    let status_code = u16::try_from(status)
        .map_err(|_| StoreError::Database(format!("Status out of range: {}", status)))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(PersistableRecord {
        user_id: row.try_get("user_id")?,
        expression_id: row.try_get("expression_id")?,
        expression_text: row.try_get("calculation")?,
        result: row.try_get("result")?,
        status_code,
        created_at,
    })
}

impl ResultStore for SqliteResultStore {
    async fn next_expression_id(&self, user_id: i64) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(expression_id), 0) AS max_id FROM calculations WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let max_id: i64 = row.try_get("max_id")?;
        Ok(max_id + 1)
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<PersistableRecord> {
        // One statement: SQLite takes the write lock before reading MAX, so
        // concurrent inserts for a user are serialized
        let row = sqlx::query(
            r#"
            INSERT INTO calculations (user_id, expression_id, calculation, result, status, created_at)
            SELECT ?, COALESCE(MAX(expression_id), 0) + 1, ?, ?, ?, ?
            FROM calculations
            WHERE user_id = ?
            RETURNING expression_id
            "#,
        )
        .bind(record.user_id)
        .bind(record.expression_text.as_str())
        .bind(record.result)
        .bind(i64::from(record.status_code))
        .bind(record.created_at)
        .bind(record.user_id)
        .fetch_one(&self.pool)
        .await?;

        let expression_id: i64 = row.try_get("expression_id")?;
        debug!(
            "Stored calculation {} for user {}",
            expression_id, record.user_id
        );
        Ok(record.with_id(expression_id))
    }

    async fn store(&self, record: &PersistableRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO calculations (user_id, expression_id, calculation, result, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id)
        .bind(record.expression_id)
        .bind(record.expression_text.as_str())
        .bind(record.result)
        .bind(i64::from(record.status_code))
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    "Stored calculation {} for user {}",
                    record.expression_id, record.user_id
                );
                Ok(())
            },
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate {
                user_id: record.user_id,
                expression_id: record.expression_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, user_id: i64, expression_id: i64) -> StoreResult<Option<PersistableRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, expression_id, calculation, result, status, created_at
            FROM calculations
            WHERE user_id = ? AND expression_id = ?
            "#,
        )
        .bind(user_id)
        .bind(expression_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_record).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<PersistableRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, expression_id, calculation, result, status, created_at
            FROM calculations
            WHERE user_id = ?
            ORDER BY expression_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(hydrate_record(row)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn record(user_id: i64, expression_id: i64) -> PersistableRecord {
        PersistableRecord {
            user_id,
            expression_id,
            expression_text: "2+3*4; (1+1)".to_string(),
            result: 16.0,
            status_code: 200,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_in_memory() {
        let store = SqliteResultStore::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.next_expression_id(1).await.unwrap(), 1);

        let rec = record(1, 1);
        store.store(&rec).await.unwrap();

        let loaded = store.get(1, 1).await.unwrap().unwrap();
        assert_eq!(loaded.expression_text, rec.expression_text);
        assert_eq!(loaded.result, 16.0);
        assert_eq!(loaded.status_code, 200);
        assert_eq!(store.next_expression_id(1).await.unwrap(), 2);
        assert!(store.get(1, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_per_user() {
        let store = SqliteResultStore::connect("sqlite::memory:").await.unwrap();
        store.store(&record(1, 3)).await.unwrap();

        let draft = NewRecord {
            user_id: 1,
            expression_text: "1+1".to_string(),
            result: 2.0,
            status_code: 200,
            created_at: Utc::now(),
        };
        let stored = store.insert(draft.clone()).await.unwrap();
        assert_eq!(stored.expression_id, 4);
        assert_eq!(store.get(1, 4).await.unwrap().unwrap().result, 2.0);

        let other = store.insert(NewRecord { user_id: 2, ..draft }).await.unwrap();
        assert_eq!(other.expression_id, 1);
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let store = SqliteResultStore::connect("sqlite::memory:").await.unwrap();
        store.store(&record(4, 1)).await.unwrap();
        let err = store.store(&record(4, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { user_id: 4, expression_id: 1 }));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("calc.db").display());

        let store = SqliteResultStore::connect(&url).await.unwrap();
        store.store(&record(9, 1)).await.unwrap();
        store.store(&record(9, 2)).await.unwrap();
        store.close().await;

        let reopened = SqliteResultStore::connect(&url).await.unwrap();
        let ids: Vec<i64> = reopened
            .list_for_user(9)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.expression_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
