//! In-memory implementations of the store traits.
//!
//! Same contracts as `SqliteStore`: observations are deduplicated by date, a prediction batch
//! is validated in full before any row becomes visible. Data is lost on restart.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::misc::{DATE_FORMAT, Observation, Prediction, PredictionRow, PricePoint};
use crate::store::{ModelStore, ObservationStore, PredictionStore};

type Series<T> = HashMap<String, BTreeMap<NaiveDate, T>>;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    observations: Arc<RwLock<Series<f64>>>,
    predictions: Arc<RwLock<Series<(f64, f64)>>>,
    models: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn prediction_count(&self, instrument_id: &str) -> usize {
        self.predictions
            .read()
            .await
            .get(instrument_id)
            .map_or(0, |rows| rows.len())
    }
}

#[async_trait]
impl ObservationStore for InMemoryStore {
    async fn fetch_observations(
        &self,
        instrument_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, StoreError> {
        let observations = self.observations.read().await;
        let Some(series) = observations.get(instrument_id) else {
            return Ok(Vec::new());
        };

        Ok(series
            .iter()
            .filter(|(date, _)| since.is_none_or(|since| **date > since))
            .map(|(date, price)| Observation::new(instrument_id, *date, *price))
            .collect())
    }

    async fn fetch_tail(
        &self,
        instrument_id: &str,
        through: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let observations = self.observations.read().await;
        let Some(series) = observations.get(instrument_id) else {
            return Ok(Vec::new());
        };

        let mut tail: Vec<_> = series
            .range(..=through)
            .rev()
            .take(limit)
            .map(|(date, price)| Observation::new(instrument_id, *date, *price))
            .collect();
        tail.reverse();
        Ok(tail)
    }

    async fn append_observations(
        &self,
        instrument_id: &str,
        rows: &[PricePoint],
    ) -> Result<usize, StoreError> {
        let mut observations = self.observations.write().await;
        let series = observations.entry(instrument_id.to_string()).or_default();

        let mut inserted = 0;
        for row in rows {
            if !series.contains_key(&row.date) {
                series.insert(row.date, row.price);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl PredictionStore for InMemoryStore {
    async fn max_prediction_date(
        &self,
        instrument_id: &str,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let predictions = self.predictions.read().await;
        Ok(predictions
            .get(instrument_id)
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    async fn append_predictions(
        &self,
        instrument_id: &str,
        rows: &[PredictionRow],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut predictions = self.predictions.write().await;
        let series = predictions.entry(instrument_id.to_string()).or_default();

        let mut staged = BTreeMap::new();
        for row in rows {
            if series.contains_key(&row.date) || staged.contains_key(&row.date) {
                return Err(StoreError::DuplicatePrediction {
                    instrument_id: instrument_id.to_string(),
                    date: row.date.format(DATE_FORMAT).to_string(),
                });
            }
            staged.insert(row.date, (row.actual, row.prediction));
        }

        series.extend(staged);
        Ok(rows.len())
    }

    async fn fetch_predictions(&self, instrument_id: &str) -> Result<Vec<Prediction>, StoreError> {
        let predictions = self.predictions.read().await;
        Ok(predictions
            .get(instrument_id)
            .map(|rows| {
                rows.iter()
                    .map(|(date, (actual, prediction))| Prediction {
                        instrument_id: instrument_id.to_string(),
                        date: *date,
                        actual: *actual,
                        prediction: *prediction,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    async fn load_model(&self, instrument_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.models.read().await.get(instrument_id).cloned())
    }

    async fn save_model(&self, instrument_id: &str, state: &[u8]) -> Result<(), StoreError> {
        self.models
            .write()
            .await
            .insert(instrument_id.to_string(), state.to_vec());
        Ok(())
    }
}
