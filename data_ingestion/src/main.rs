use anyhow::{Context, Result};
use data_ingestion::config::AppConfig;
use data_ingestion::fetcher::{PriceFileReader, ingest_file};
use data_ingestion::logger::init_logger;
use data_ingestion::sqlite::SqliteStore;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let config_path = std::env::var("FORECAST_CONFIG").unwrap_or_else(|_| "forecast.toml".into());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration ({config_path})"))?;

    let store = SqliteStore::connect(&config.database.url).await?;
    let reader = PriceFileReader::new(&config.ingestion.date_column, &config.ingestion.price_column);
    let csv_path = config.csv_path();
    let instrument_id = &config.pipeline.instrument_id;

    info!("Ingesting {} from {}", instrument_id, csv_path);
    let inserted = ingest_file(&store, instrument_id, &reader, &csv_path).await?;
    info!("Ingestion complete: {} new observations for {}", inserted, instrument_id);

    Ok(())
}
