use chrono::NaiveDate;
use csv::ReaderBuilder;
use log::{info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::IngestionError;
use crate::misc::{DATE_FORMAT, PricePoint};
use crate::store::ObservationStore;

/// Reads a daily price file such as the one produced by the upstream downloader
/// (`Date,...,Adj Close,...`). Rows that fail validation are skipped with a warning.
pub struct PriceFileReader {
    date_column: String,
    price_column: String,
}

impl PriceFileReader {
    pub fn new(date_column: &str, price_column: &str) -> Self {
        Self {
            date_column: date_column.to_string(),
            price_column: price_column.to_string(),
        }
    }

    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<Vec<PricePoint>, IngestionError> {
        let file = File::open(path.as_ref()).map_err(csv::Error::from)?;
        self.read(file)
    }

    pub fn read<R: Read>(&self, source: R) -> Result<Vec<PricePoint>, IngestionError> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| IngestionError::MissingColumn(name.to_string()))
        };
        let date_idx = column(&self.date_column)?;
        let price_idx = column(&self.price_column)?;

        let mut points = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let raw_date = record.get(date_idx).unwrap_or_default();
            let raw_price = record.get(price_idx).unwrap_or_default();

            match parse_point(raw_date, raw_price) {
                Some(point) if validate_data(&point) => points.push(point),
                Some(_) => {}
                None => warn!(
                    "Skipping unparseable row {}: date={:?} price={:?}",
                    line + 2,
                    raw_date,
                    raw_price
                ),
            }
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

// Daily files may carry a time part ("2024-01-02 00:00:00-05:00"); only the day matters.
fn parse_point(raw_date: &str, raw_price: &str) -> Option<PricePoint> {
    let day = raw_date.get(..10)?;
    let date = NaiveDate::parse_from_str(day, DATE_FORMAT).ok()?;
    let price = raw_price.parse::<f64>().ok()?;
    Some(PricePoint { date, price })
}

pub fn validate_data(point: &PricePoint) -> bool {
    if !point.price.is_finite() {
        warn!("Non-finite price on {}", point.date);
        return false;
    }

    if point.price <= 0.0 {
        warn!("Price must be positive on {}: {}", point.date, point.price);
        return false;
    }

    true
}

/// Loads a price file into the observation store. Returns how many rows were new.
pub async fn ingest_file(
    store: &dyn ObservationStore,
    instrument_id: &str,
    reader: &PriceFileReader,
    path: impl AsRef<Path>,
) -> Result<usize, IngestionError> {
    let points = reader.read_path(path.as_ref())?;
    info!(
        "Read {} valid rows for {} from {:?}",
        points.len(),
        instrument_id,
        path.as_ref()
    );

    let inserted = store.append_observations(instrument_id, &points).await?;
    Ok(inserted)
}
