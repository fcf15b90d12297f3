use data_ingestion::StoreError;
use data_ingestion::misc::PredictionRow;
use data_ingestion::store::PredictionStore;
use log::debug;
use std::sync::Arc;

/// Appends a cycle's predictions in a single all-or-nothing write.
pub struct PredictionRecorder {
    predictions: Arc<dyn PredictionStore>,
}

impl PredictionRecorder {
    pub fn new(predictions: Arc<dyn PredictionStore>) -> Self {
        Self { predictions }
    }

    pub async fn record(
        &self,
        instrument_id: &str,
        rows: &[PredictionRow],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let written = self.predictions.append_predictions(instrument_id, rows).await?;
        debug!("Recorded {} predictions for {}", written, instrument_id);
        Ok(written)
    }
}
