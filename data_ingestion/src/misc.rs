use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily price of an instrument as kept by the observation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub instrument_id: String,
    pub date: NaiveDate,
    pub price: f64,
}

/// A `(date, price)` pair handed to the observation store for a known instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Output of one predict-then-learn step, before it is tied to an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub actual: f64,
    pub prediction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub instrument_id: String,
    pub date: NaiveDate,
    pub actual: f64,
    pub prediction: f64,
}

impl Observation {
    pub fn new(instrument_id: &str, date: NaiveDate, price: f64) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            date,
            price,
        }
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
