use chrono::NaiveDate;
use data_ingestion::store::{ObservationStore, PredictionStore};
use feature_processing::FeatureBuilder;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::engine::{Learner, OnlineModel};
use crate::error::CycleError;
use crate::reader::RangeReader;
use crate::recorder::PredictionRecorder;
use crate::watermark::WatermarkResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    ResolvingWatermark,
    Reading,
    Featurizing,
    PredictingLearning,
    Recording,
    Sleeping,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "IDLE",
            CycleState::ResolvingWatermark => "RESOLVING_WATERMARK",
            CycleState::Reading => "READING",
            CycleState::Featurizing => "FEATURIZING",
            CycleState::PredictingLearning => "PREDICTING_LEARNING",
            CycleState::Recording => "RECORDING",
            CycleState::Sleeping => "SLEEPING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing was written. `observations` counts unprocessed rows that could not be featurized yet.
    NoOp {
        watermark: Option<NaiveDate>,
        observations: usize,
    },
    Completed {
        watermark: Option<NaiveDate>,
        predictions: usize,
        through: NaiveDate,
    },
}

/// Drives fetch, featurize, test-then-train and record for one instrument, forever.
pub struct CycleScheduler<M> {
    instrument_id: String,
    resolver: WatermarkResolver,
    reader: RangeReader,
    builder: FeatureBuilder,
    learner: Learner<M>,
    recorder: PredictionRecorder,
    interval: Duration,
    state: CycleState,
}

impl<M> CycleScheduler<M>
where
    M: OnlineModel + Clone + Serialize + DeserializeOwned,
{
    pub fn new(
        instrument_id: &str,
        observations: Arc<dyn ObservationStore>,
        predictions: Arc<dyn PredictionStore>,
        builder: FeatureBuilder,
        learner: Learner<M>,
        interval: Duration,
    ) -> Self {
        let lookback = builder.windows().max_lookback();
        Self {
            instrument_id: instrument_id.to_string(),
            resolver: WatermarkResolver::new(predictions.clone()),
            reader: RangeReader::new(observations, lookback),
            builder,
            learner,
            recorder: PredictionRecorder::new(predictions),
            interval,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn learner(&self) -> &Learner<M> {
        &self.learner
    }

    fn transition(&mut self, next: CycleState) {
        debug!("{}: {} -> {}", self.instrument_id, self.state, next);
        self.state = next;
    }

    /// Runs one cycle and logs its outcome. A failed cycle leaves persisted state untouched.
    /// The scheduler stays in the last stage it reached until the loop moves it to sleep.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let result = self.cycle().await;

        match &result {
            Ok(CycleOutcome::NoOp {
                watermark,
                observations: 0,
            }) => info!(
                "No-op cycle for {}: no new observations after {:?}",
                self.instrument_id, watermark
            ),
            Ok(CycleOutcome::NoOp {
                observations,
                ..
            }) => info!(
                "No-op cycle for {}: {} new observations, not enough history for features",
                self.instrument_id, observations
            ),
            Ok(CycleOutcome::Completed {
                predictions,
                through,
                ..
            }) => info!(
                "Cycle completed for {}: {} predictions recorded through {}",
                self.instrument_id, predictions, through
            ),
            Err(e) if e.is_transient() => warn!(
                "Cycle aborted for {}, retrying next tick: {}",
                self.instrument_id, e
            ),
            Err(e) => error!("Cycle aborted for {} on a data defect: {}", self.instrument_id, e),
        }

        // Also retries a checkpoint that failed in an earlier cycle.
        if self.learner.is_dirty()
            && let Err(e) = self.learner.checkpoint().await
        {
            warn!(
                "Model checkpoint failed for {}, will retry: {}",
                self.instrument_id, e
            );
        }

        result
    }

    async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let instrument_id = self.instrument_id.clone();

        self.transition(CycleState::ResolvingWatermark);
        let watermark = self.resolver.resolve(&instrument_id).await?;

        self.transition(CycleState::Reading);
        let window = self.reader.read(&instrument_id, watermark).await?;
        if window.is_empty() {
            return Ok(CycleOutcome::NoOp {
                watermark,
                observations: 0,
            });
        }
        let unprocessed = window.unprocessed.len();

        self.transition(CycleState::Featurizing);
        let rows = self
            .builder
            .build(&window.into_contiguous())?
            .after(watermark);
        if rows.is_empty() {
            return Ok(CycleOutcome::NoOp {
                watermark,
                observations: unprocessed,
            });
        }

        self.transition(CycleState::PredictingLearning);
        let (candidate, predictions) = self.learner.evaluate(rows);

        self.transition(CycleState::Recording);
        let written = self.recorder.record(&instrument_id, &predictions).await?;
        self.learner.commit(candidate);

        // `predictions` is non-empty here
        let through = predictions[predictions.len() - 1].date;
        Ok(CycleOutcome::Completed {
            watermark,
            predictions: written,
            through,
        })
    }

    /// Repeats cycles every `interval` until `shutdown` resolves, then flushes the model.
    /// The shutdown signal is only observed while sleeping, never mid-cycle.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), CycleError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Starting forecasting loop for {} every {:?}",
            self.instrument_id, self.interval
        );

        loop {
            // Outcome and errors are logged by run_cycle; the loop never stops on them.
            let _ = self.run_cycle().await;

            self.transition(CycleState::Sleeping);
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal, stopping loop for {}", self.instrument_id);
                    break;
                }
                _ = sleep(self.interval) => {}
            }
            self.transition(CycleState::Idle);
        }

        self.teardown().await
    }

    pub async fn teardown(&mut self) -> Result<(), CycleError> {
        if self.learner.checkpoint().await? {
            info!("Flushed model state for {}", self.instrument_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OnlineLinearRegression;
    use crate::testing::{FlakyPredictionStore, UnreachableStore};
    use data_ingestion::memory::InMemoryStore;
    use data_ingestion::misc::PricePoint;
    use data_ingestion::store::ModelStore;

    const ID: &str = "AAPL";

    const SCENARIO: [f64; 11] = [
        100.0, 102.0, 101.0, 105.0, 107.0, 106.0, 110.0, 108.0, 112.0, 115.0, 117.0,
    ];

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64)
    }

    fn price(i: usize) -> f64 {
        100.0 + i as f64 * 0.5 + (i as f64 * 0.9).sin() * 3.0
    }

    async fn ingest(store: &InMemoryStore, range: std::ops::Range<usize>) {
        let points: Vec<_> = range
            .map(|i| PricePoint {
                date: day(i),
                price: price(i),
            })
            .collect();
        store.append_observations(ID, &points).await.unwrap();
    }

    async fn scheduler_with(
        store: &InMemoryStore,
        predictions: Arc<dyn PredictionStore>,
        interval: Duration,
    ) -> CycleScheduler<OnlineLinearRegression> {
        let shared = Arc::new(store.clone());
        let learner = Learner::load(ID, shared.clone(), OnlineLinearRegression::default)
            .await
            .unwrap();
        CycleScheduler::new(
            ID,
            shared,
            predictions,
            FeatureBuilder::default(),
            learner,
            interval,
        )
    }

    async fn scheduler(store: &InMemoryStore) -> CycleScheduler<OnlineLinearRegression> {
        scheduler_with(store, Arc::new(store.clone()), Duration::from_secs(60)).await
    }

    #[tokio::test]
    async fn test_scenario_yields_single_prediction_for_last_day() {
        let store = InMemoryStore::new();
        let points: Vec<_> = SCENARIO
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint {
                date: day(i),
                price: *p,
            })
            .collect();
        store.append_observations(ID, &points).await.unwrap();

        let mut scheduler = scheduler(&store).await;
        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                watermark: None,
                predictions: 1,
                through: day(10),
            }
        );

        let recorded = store.fetch_predictions(ID).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].date, day(10));
        assert_eq!(recorded[0].actual, 117.0);
        // Predicted before the fresh model ever saw a label
        assert_eq!(recorded[0].prediction, 0.0);
        assert_eq!(scheduler.learner().model().seen(), 1);
        assert_eq!(scheduler.state(), CycleState::Recording);
    }

    #[tokio::test]
    async fn test_second_cycle_without_ingestion_is_noop() {
        let store = InMemoryStore::new();
        ingest(&store, 0..25).await;

        let mut scheduler = scheduler(&store).await;
        scheduler.run_cycle().await.unwrap();

        let predictions_before = store.fetch_predictions(ID).await.unwrap();
        let model_before = store.load_model(ID).await.unwrap();
        assert_eq!(predictions_before.len(), 15);
        assert!(model_before.is_some());

        let outcome = scheduler.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::NoOp {
                watermark: Some(day(24)),
                observations: 0,
            }
        );
        assert_eq!(store.fetch_predictions(ID).await.unwrap(), predictions_before);
        assert_eq!(store.load_model(ID).await.unwrap(), model_before);
    }

    #[tokio::test]
    async fn test_short_history_is_noop_until_window_fills() {
        let store = InMemoryStore::new();
        ingest(&store, 0..10).await;

        let mut scheduler = scheduler(&store).await;
        assert_eq!(
            scheduler.run_cycle().await.unwrap(),
            CycleOutcome::NoOp {
                watermark: None,
                observations: 10,
            }
        );
        assert!(store.load_model(ID).await.unwrap().is_none());

        ingest(&store, 10..11).await;
        assert!(matches!(
            scheduler.run_cycle().await.unwrap(),
            CycleOutcome::Completed { predictions: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_watermark_only_moves_forward() {
        let store = InMemoryStore::new();
        let mut scheduler = scheduler(&store).await;
        let resolver = WatermarkResolver::new(Arc::new(store.clone()));

        let batches = [0..12, 12..13, 13..13, 13..17, 17..30];
        let mut previous: Option<NaiveDate> = None;

        for batch in batches {
            ingest(&store, batch).await;
            let before = resolver.resolve(ID).await.unwrap();
            let known: Vec<_> = store
                .fetch_predictions(ID)
                .await
                .unwrap()
                .into_iter()
                .map(|p| p.date)
                .collect();

            scheduler.run_cycle().await.unwrap();

            let after = resolver.resolve(ID).await.unwrap();
            assert!(after >= before);
            assert!(before >= previous);
            previous = after;

            // New rows are all strictly after the watermark the cycle started from
            for p in store.fetch_predictions(ID).await.unwrap() {
                if !known.contains(&p.date) {
                    assert!(before.is_none_or(|w| p.date > w));
                }
            }
        }

        // Every day after the cold-start lookback was predicted exactly once
        let dates: Vec<_> = store
            .fetch_predictions(ID)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(dates, (10..30).map(day).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batched_cycles_match_single_pass() {
        let batched = InMemoryStore::new();
        let mut incremental = scheduler(&batched).await;
        for batch in [0..14, 14..15, 15..22, 22..40] {
            ingest(&batched, batch).await;
            incremental.run_cycle().await.unwrap();
        }

        let single = InMemoryStore::new();
        ingest(&single, 0..40).await;
        scheduler(&single).await.run_cycle().await.unwrap();

        let a = batched.fetch_predictions(ID).await.unwrap();
        let b = single.fetch_predictions(ID).await.unwrap();
        assert_eq!(a.len(), 30);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.date, y.date);
            assert_eq!(x.actual, y.actual);
            assert!((x.prediction - y.prediction).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_failed_recording_leaves_no_trace() {
        let store = InMemoryStore::new();
        ingest(&store, 0..15).await;
        let flaky = Arc::new(FlakyPredictionStore::new(store.clone(), Some(3)));

        let mut scheduler = scheduler_with(&store, flaky.clone(), Duration::from_secs(60)).await;
        let err = scheduler.run_cycle().await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.prediction_count(ID).await, 0);
        assert_eq!(store.max_prediction_date(ID).await.unwrap(), None);
        assert_eq!(scheduler.learner().model().seen(), 0);
        assert!(store.load_model(ID).await.unwrap().is_none());
        assert_eq!(scheduler.state(), CycleState::Recording);

        flaky.heal();
        let outcome = scheduler.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { predictions: 5, .. }));
        assert_eq!(store.prediction_count(ID).await, 5);
        assert_eq!(scheduler.learner().model().seen(), 5);
    }

    #[tokio::test]
    async fn test_unreachable_store_aborts_cycle() {
        let store = InMemoryStore::new();
        let learner = Learner::load(ID, Arc::new(store.clone()), OnlineLinearRegression::default)
            .await
            .unwrap();
        let mut scheduler = CycleScheduler::new(
            ID,
            Arc::new(UnreachableStore),
            Arc::new(UnreachableStore),
            FeatureBuilder::default(),
            learner,
            Duration::from_secs(60),
        );

        let err = scheduler.run_cycle().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.load_model(ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restart_resumes_from_saved_model() {
        let store = InMemoryStore::new();
        ingest(&store, 0..20).await;

        let mut first = scheduler(&store).await;
        first.run_cycle().await.unwrap();
        let trained = first.learner().model().clone();
        drop(first);

        let second = scheduler(&store).await;
        assert_eq!(second.learner().model(), &trained);
        assert_eq!(second.learner().model().seen(), 10);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown_and_flushes() {
        let store = InMemoryStore::new();
        ingest(&store, 0..12).await;

        let mut scheduler = scheduler(&store).await;
        scheduler.run_until(async {}).await.unwrap();

        assert_eq!(store.prediction_count(ID).await, 2);
        assert!(store.load_model(ID).await.unwrap().is_some());
        assert!(!scheduler.learner().is_dirty());
        assert_eq!(scheduler.state(), CycleState::Sleeping);
    }

    #[tokio::test]
    async fn test_noop_cycle_stops_at_reading() {
        let store = InMemoryStore::new();
        let mut scheduler = scheduler(&store).await;

        scheduler.run_cycle().await.unwrap();
        assert_eq!(scheduler.state(), CycleState::Reading);
    }

    #[tokio::test]
    async fn test_loop_keeps_running_after_failed_cycle() {
        let store = InMemoryStore::new();
        ingest(&store, 0..15).await;
        let flaky = Arc::new(FlakyPredictionStore::new(store.clone(), Some(3)));
        let mut scheduler =
            scheduler_with(&store, flaky.clone(), Duration::from_millis(1)).await;

        // Heals the store once the first write has failed, stops once rows land.
        let watcher = flaky.clone();
        let observed = store.clone();
        let shutdown = async move {
            loop {
                if watcher.append_calls() >= 1 {
                    watcher.heal();
                }
                if observed.prediction_count(ID).await > 0 {
                    break;
                }
                sleep(Duration::from_millis(1)).await;
            }
        };

        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until(shutdown))
            .await
            .expect("loop did not stop")
            .unwrap();

        assert!(flaky.append_calls() >= 2);
        assert_eq!(store.prediction_count(ID).await, 5);
        assert_eq!(scheduler.learner().model().seen(), 5);
        assert!(store.load_model(ID).await.unwrap().is_some());
        assert!(!scheduler.learner().is_dirty());
    }
}
