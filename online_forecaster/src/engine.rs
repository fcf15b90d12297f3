use data_ingestion::misc::PredictionRow;
use data_ingestion::store::ModelStore;
use feature_processing::{FeatureRows, FeatureVector};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::LearnerError;

const MODEL_STATE_VERSION: u32 = 1;

/// A forecaster that is updated one labelled row at a time.
pub trait OnlineModel {
    fn predict_one(&self, features: &FeatureVector) -> f64;

    fn learn_one(&mut self, features: &FeatureVector, label: f64);
}

/// Runs the rows through `model` in date order. Each row is predicted first and only then
/// learned, so a recorded prediction never depends on its own label.
pub fn test_then_train<M: OnlineModel>(model: &mut M, rows: FeatureRows) -> Vec<PredictionRow> {
    rows.map(|row| {
        let prediction = model.predict_one(&row.features);
        model.learn_one(&row.features, row.label);
        PredictionRow {
            date: row.date,
            actual: row.label,
            prediction,
        }
    })
    .collect()
}

#[derive(Serialize, Deserialize)]
struct ModelState<M> {
    version: u32,
    model: M,
}

/// Owns the live model of one instrument and its persisted copy.
pub struct Learner<M> {
    instrument_id: String,
    model: M,
    store: Arc<dyn ModelStore>,
    dirty: bool,
}

impl<M> Learner<M>
where
    M: OnlineModel + Clone + Serialize + DeserializeOwned,
{
    /// Restores the persisted state, or starts from `fresh` when none has been saved.
    pub async fn load(
        instrument_id: &str,
        store: Arc<dyn ModelStore>,
        fresh: impl FnOnce() -> M,
    ) -> Result<Self, LearnerError> {
        let model = match store.load_model(instrument_id).await? {
            Some(bytes) => {
                let state: ModelState<M> = decode_state(&bytes)?;
                info!("Restored model state for {} ({} bytes)", instrument_id, bytes.len());
                state.model
            }
            None => {
                info!("No saved model for {}, starting fresh", instrument_id);
                fresh()
            }
        };

        Ok(Self {
            instrument_id: instrument_id.to_string(),
            model,
            store,
            dirty: false,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Test-then-train on a copy of the live model. The live model is untouched until `commit`.
    pub fn evaluate(&self, rows: FeatureRows) -> (M, Vec<PredictionRow>) {
        let mut candidate = self.model.clone();
        let predictions = test_then_train(&mut candidate, rows);
        (candidate, predictions)
    }

    pub fn commit(&mut self, candidate: M) {
        self.model = candidate;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Saves the live model if it changed since the last save. Returns whether a save happened.
    pub async fn checkpoint(&mut self) -> Result<bool, LearnerError> {
        if !self.dirty {
            return Ok(false);
        }

        let bytes = bincode::serialize(&ModelState {
            version: MODEL_STATE_VERSION,
            model: &self.model,
        })?;
        self.store.save_model(&self.instrument_id, &bytes).await?;
        self.dirty = false;

        debug!("Checkpointed model for {}", self.instrument_id);
        Ok(true)
    }
}

fn decode_state<M: DeserializeOwned>(bytes: &[u8]) -> Result<ModelState<M>, LearnerError> {
    // The version leads the envelope, so it can be checked before decoding the model.
    let version: u32 = bincode::deserialize(bytes)?;
    if version != MODEL_STATE_VERSION {
        return Err(LearnerError::IncompatibleState {
            found: version,
            expected: MODEL_STATE_VERSION,
        });
    }
    Ok(bincode::deserialize(bytes)?)
}
