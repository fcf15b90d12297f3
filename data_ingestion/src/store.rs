//! Storage boundaries of the forecasting loop.
//!
//! Three independent traits so each collaborator can be backed by a different engine:
//! - `ObservationStore`: append-only daily prices, read back by date range
//! - `PredictionStore`: append-only `(date, actual, prediction)` history, source of the watermark
//! - `ModelStore`: opaque per-instrument model blobs
//!
//! `SqliteStore` implements all three on one database, `InMemoryStore` does the same for tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::misc::{Observation, Prediction, PredictionRow, PricePoint};

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Observations with `date > since` (all of them when `since` is `None`), ascending by date.
    async fn fetch_observations(
        &self,
        instrument_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, StoreError>;

    /// The last `limit` observations with `date <= through`, ascending by date.
    async fn fetch_tail(
        &self,
        instrument_id: &str,
        through: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Inserts new points, ignoring dates already present. Returns the number inserted.
    async fn append_observations(
        &self,
        instrument_id: &str,
        rows: &[PricePoint],
    ) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn max_prediction_date(&self, instrument_id: &str)
    -> Result<Option<NaiveDate>, StoreError>;

    /// Writes all rows or none of them.
    async fn append_predictions(
        &self,
        instrument_id: &str,
        rows: &[PredictionRow],
    ) -> Result<usize, StoreError>;

    /// Full history, ascending by date.
    async fn fetch_predictions(&self, instrument_id: &str) -> Result<Vec<Prediction>, StoreError>;
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn load_model(&self, instrument_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn save_model(&self, instrument_id: &str, state: &[u8]) -> Result<(), StoreError>;
}
