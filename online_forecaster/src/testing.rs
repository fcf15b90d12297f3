//! Store doubles for failure injection.

use async_trait::async_trait;
use chrono::NaiveDate;
use data_ingestion::StoreError;
use data_ingestion::memory::InMemoryStore;
use data_ingestion::misc::{Observation, Prediction, PredictionRow, PricePoint};
use data_ingestion::store::{ModelStore, ObservationStore, PredictionStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Every call fails as if the database were down.
pub struct UnreachableStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl ObservationStore for UnreachableStore {
    async fn fetch_observations(
        &self,
        _instrument_id: &str,
        _since: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, StoreError> {
        unavailable()
    }

    async fn fetch_tail(
        &self,
        _instrument_id: &str,
        _through: NaiveDate,
        _limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        unavailable()
    }

    async fn append_observations(
        &self,
        _instrument_id: &str,
        _rows: &[PricePoint],
    ) -> Result<usize, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl PredictionStore for UnreachableStore {
    async fn max_prediction_date(
        &self,
        _instrument_id: &str,
    ) -> Result<Option<NaiveDate>, StoreError> {
        unavailable()
    }

    async fn append_predictions(
        &self,
        _instrument_id: &str,
        _rows: &[PredictionRow],
    ) -> Result<usize, StoreError> {
        unavailable()
    }

    async fn fetch_predictions(&self, _instrument_id: &str) -> Result<Vec<Prediction>, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl ModelStore for UnreachableStore {
    async fn load_model(&self, _instrument_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        unavailable()
    }

    async fn save_model(&self, _instrument_id: &str, _state: &[u8]) -> Result<(), StoreError> {
        unavailable()
    }
}

/// Prediction store whose batch write dies after `fail_after` rows and rolls back,
/// the way a transactional store does.
pub struct FlakyPredictionStore {
    inner: InMemoryStore,
    fail_after: Option<usize>,
    appends: AtomicUsize,
    healed: AtomicBool,
}

impl FlakyPredictionStore {
    pub fn new(inner: InMemoryStore, fail_after: Option<usize>) -> Self {
        Self {
            inner,
            fail_after,
            appends: AtomicUsize::new(0),
            healed: AtomicBool::new(false),
        }
    }

    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// Later writes succeed.
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PredictionStore for FlakyPredictionStore {
    async fn max_prediction_date(
        &self,
        instrument_id: &str,
    ) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.max_prediction_date(instrument_id).await
    }

    async fn append_predictions(
        &self,
        instrument_id: &str,
        rows: &[PredictionRow],
    ) -> Result<usize, StoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);

        match self.fail_after {
            Some(limit) if !self.healed.load(Ordering::SeqCst) && rows.len() > limit => {
                // Staged rows are discarded with the failed batch.
                Err(StoreError::Unavailable(format!(
                    "connection lost after {limit} rows"
                )))
            }
            _ => self.inner.append_predictions(instrument_id, rows).await,
        }
    }

    async fn fetch_predictions(&self, instrument_id: &str) -> Result<Vec<Prediction>, StoreError> {
        self.inner.fetch_predictions(instrument_id).await
    }
}
