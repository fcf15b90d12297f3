use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::error::StoreError;
use crate::misc::{DATE_FORMAT, Observation, Prediction, PredictionRow, PricePoint};
use crate::store::{ModelStore, ObservationStore, PredictionStore};

/// SQLite-backed observation, prediction and model store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let in_memory = db_url.contains(":memory:");

        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let pool = if in_memory {
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

        info!("Connected to database: {}", db_url);

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                instrument_id TEXT NOT NULL,
                date TEXT NOT NULL,
                price REAL NOT NULL,
                PRIMARY KEY (instrument_id, date)
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                instrument_id TEXT NOT NULL,
                date TEXT NOT NULL,
                actual REAL NOT NULL,
                prediction REAL NOT NULL,
                PRIMARY KEY (instrument_id, date)
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_states (
                instrument_id TEXT PRIMARY KEY,
                state BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!("Database schema initialized.");
        Ok(())
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(table: &'static str, raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StoreError::CorruptRow {
        table,
        reason: format!("bad date {raw:?}: {e}"),
    })
}

fn to_observations(
    instrument_id: &str,
    rows: Vec<(String, f64)>,
) -> Result<Vec<Observation>, StoreError> {
    rows.into_iter()
        .map(|(date, price)| {
            Ok(Observation::new(
                instrument_id,
                parse_date("observations", &date)?,
                price,
            ))
        })
        .collect()
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn fetch_observations(
        &self,
        instrument_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, StoreError> {
        let rows: Vec<(String, f64)> = match since {
            Some(since) => {
                sqlx::query_as(
                    "SELECT date, price FROM observations
                     WHERE instrument_id = ? AND date > ? ORDER BY date ASC",
                )
                .bind(instrument_id)
                .bind(format_date(since))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT date, price FROM observations
                     WHERE instrument_id = ? ORDER BY date ASC",
                )
                .bind(instrument_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        to_observations(instrument_id, rows)
    }

    async fn fetch_tail(
        &self,
        instrument_id: &str,
        through: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let mut rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT date, price FROM observations
             WHERE instrument_id = ? AND date <= ? ORDER BY date DESC LIMIT ?",
        )
        .bind(instrument_id)
        .bind(format_date(through))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();

        to_observations(instrument_id, rows)
    }

    async fn append_observations(
        &self,
        instrument_id: &str,
        rows: &[PricePoint],
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO observations (instrument_id, date, price) VALUES (?, ?, ?)
                 ON CONFLICT(instrument_id, date) DO NOTHING",
            )
            .bind(instrument_id)
            .bind(format_date(row.date))
            .bind(row.price)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Appended {} observations for {}", inserted, instrument_id);
        Ok(inserted)
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn max_prediction_date(
        &self,
        instrument_id: &str,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let max: Option<String> =
            sqlx::query_scalar("SELECT MAX(date) FROM predictions WHERE instrument_id = ?")
                .bind(instrument_id)
                .fetch_one(&self.pool)
                .await?;

        max.map(|raw| parse_date("predictions", &raw)).transpose()
    }

    async fn append_predictions(
        &self,
        instrument_id: &str,
        rows: &[PredictionRow],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        // Dropping the transaction on any error rolls the whole batch back.
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO predictions (instrument_id, date, actual, prediction)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(instrument_id)
            .bind(format_date(row.date))
            .bind(row.actual)
            .bind(row.prediction)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    async fn fetch_predictions(&self, instrument_id: &str) -> Result<Vec<Prediction>, StoreError> {
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            "SELECT date, actual, prediction FROM predictions
             WHERE instrument_id = ? ORDER BY date ASC",
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(date, actual, prediction)| {
                Ok(Prediction {
                    instrument_id: instrument_id.to_string(),
                    date: parse_date("predictions", &date)?,
                    actual,
                    prediction,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ModelStore for SqliteStore {
    async fn load_model(&self, instrument_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let state: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT state FROM model_states WHERE instrument_id = ?")
                .bind(instrument_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(state)
    }

    async fn save_model(&self, instrument_id: &str, state: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO model_states (instrument_id, state, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(instrument_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at",
        )
        .bind(instrument_id)
        .bind(state)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!("Saved {} byte model state for {}", state.len(), instrument_id);
        Ok(())
    }
}
