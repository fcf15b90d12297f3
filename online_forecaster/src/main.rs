use anyhow::{Context, Result};
use data_ingestion::config::AppConfig;
use data_ingestion::logger::init_logger;
use data_ingestion::sqlite::SqliteStore;
use feature_processing::{FeatureBuilder, FeatureWindows};
use log::{error, info};
use online_forecaster::engine::Learner;
use online_forecaster::model::OnlineLinearRegression;
use online_forecaster::scheduler::CycleScheduler;
use online_forecaster::server::Server;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Pipeline {
    scheduler: CycleScheduler<OnlineLinearRegression>,
    server: Option<Server>,
}

impl Pipeline {
    async fn new(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::connect(&config.database.url).await?);
        let instrument_id = &config.pipeline.instrument_id;

        let model_config = config.model;
        let learner = Learner::load(instrument_id, store.clone(), || {
            OnlineLinearRegression::new(&model_config)
        })
        .await?;

        let scheduler = CycleScheduler::new(
            instrument_id,
            store.clone(),
            store.clone(),
            FeatureBuilder::new(FeatureWindows::from(&config.features)),
            learner,
            Duration::from_secs(config.pipeline.cycle_interval_secs),
        );

        let server = match &config.api.bind_addr {
            Some(addr) => {
                let addr: SocketAddr = addr
                    .parse()
                    .with_context(|| format!("Invalid api.bind_addr {addr:?}"))?;
                Some(Server::init(store, addr))
            }
            None => None,
        };

        Ok(Self { scheduler, server })
    }

    async fn run(self) -> Result<()> {
        let Self {
            mut scheduler,
            server,
        } = self;

        let api: Option<JoinHandle<()>> = server.map(|server| {
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("HTTP server failed: {:?}", e);
                }
            })
        });

        // Register the handler up front so a signal during the first cycle is not lost.
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(forward_shutdown(signal::ctrl_c(), shutdown_tx));

        let result = scheduler
            .run_until(async {
                let _ = shutdown_rx.await;
            })
            .await;

        if let Some(api) = api {
            api.abort();
        }

        result?;
        Ok(())
    }
}

/// Fires `tx` when `signal` arrives. If the signal cannot be registered the sender is
/// held forever, so the loop keeps running instead of seeing a closed channel.
async fn forward_shutdown<S>(signal: S, tx: oneshot::Sender<()>)
where
    S: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            let _ = tx.send(());
        }
        Err(e) => {
            error!("Cannot listen for shutdown signal: {}", e);
            let _held = tx;
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let config_path = std::env::var("FORECAST_CONFIG").unwrap_or_else(|_| "forecast.toml".into());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration ({config_path})"))?;

    let pipeline = Pipeline::new(&config).await?;
    info!(
        "Forecasting {} every {}s",
        config.pipeline.instrument_id, config.pipeline.cycle_interval_secs
    );

    pipeline.run().await?;

    info!("Pipeline has been shut down gracefully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_fires_shutdown() {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(forward_shutdown(async { Ok(()) }, tx));
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_registration_keeps_loop_alive() {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(forward_shutdown(
            async { Err(io::Error::other("no signal handler")) },
            tx,
        ));

        let waited = tokio::time::timeout(Duration::from_millis(50), rx).await;
        assert!(waited.is_err(), "shutdown channel resolved without a signal");
    }
}
