use chrono::NaiveDate;
use data_ingestion::StoreError;
use data_ingestion::misc::Observation;
use data_ingestion::store::ObservationStore;
use std::sync::Arc;

/// Observations of one cycle: trailing history already covered by the watermark,
/// followed by the unprocessed rows.
#[derive(Debug, Default)]
pub struct ObservationWindow {
    pub history: Vec<Observation>,
    pub unprocessed: Vec<Observation>,
}

impl ObservationWindow {
    pub fn is_empty(&self) -> bool {
        self.unprocessed.is_empty()
    }

    pub fn into_contiguous(self) -> Vec<Observation> {
        let mut rows = self.history;
        rows.extend(self.unprocessed);
        rows
    }
}

/// Range reads against the observation store.
pub struct RangeReader {
    observations: Arc<dyn ObservationStore>,
    lookback: usize,
}

impl RangeReader {
    /// `lookback` is how many already-processed rows are carried in front of new ones,
    /// so trailing windows of the first new rows are filled from earlier cycles.
    pub fn new(observations: Arc<dyn ObservationStore>, lookback: usize) -> Self {
        Self {
            observations,
            lookback,
        }
    }

    pub async fn read(
        &self,
        instrument_id: &str,
        watermark: Option<NaiveDate>,
    ) -> Result<ObservationWindow, StoreError> {
        let unprocessed = self
            .observations
            .fetch_observations(instrument_id, watermark)
            .await?;

        // Nothing new means nothing else to read.
        if unprocessed.is_empty() {
            return Ok(ObservationWindow::default());
        }

        let history = match watermark {
            Some(watermark) if self.lookback > 0 => {
                self.observations
                    .fetch_tail(instrument_id, watermark, self.lookback)
                    .await?
            }
            _ => Vec::new(),
        };

        Ok(ObservationWindow {
            history,
            unprocessed,
        })
    }
}
