use anyhow::{Context, Result};
use data_ingestion::config::AppConfig;
use data_ingestion::logger::init_logger;
use data_ingestion::sqlite::SqliteStore;
use data_ingestion::store::PredictionStore;
use log::info;
use online_forecaster::export::write_predictions_csv;
use std::fs::{self, File};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let config_path = std::env::var("FORECAST_CONFIG").unwrap_or_else(|_| "forecast.toml".into());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration ({config_path})"))?;

    let store = SqliteStore::connect(&config.database.url).await?;
    let history = store
        .fetch_predictions(&config.pipeline.instrument_id)
        .await?;

    let path = Path::new(&config.export.path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let rows = write_predictions_csv(file, &history)?;

    info!("Exported {} predictions to {}", rows, path.display());
    Ok(())
}
