use chrono::NaiveDate;
use data_ingestion::StoreError;
use data_ingestion::store::PredictionStore;
use std::sync::Arc;

/// Latest date already reflected in persisted predictions.
pub struct WatermarkResolver {
    predictions: Arc<dyn PredictionStore>,
}

impl WatermarkResolver {
    pub fn new(predictions: Arc<dyn PredictionStore>) -> Self {
        Self { predictions }
    }

    /// `None` means nothing has been predicted yet and the full history is unprocessed.
    /// A store failure is returned as an error, never as `None`.
    pub async fn resolve(&self, instrument_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.predictions.max_prediction_date(instrument_id).await
    }
}
