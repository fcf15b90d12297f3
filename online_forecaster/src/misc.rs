use chrono::NaiveDate;
use data_ingestion::misc::Prediction;
use serde::Serialize;

use crate::trend::{TrendAgreement, label_history};

/// One row of the prediction table served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionView {
    pub date: NaiveDate,
    pub actual: f64,
    pub prediction: f64,
    pub trend_agreement: Option<TrendAgreement>,
}

pub fn to_views(history: &[Prediction]) -> Vec<PredictionView> {
    history
        .iter()
        .zip(label_history(history))
        .map(|(p, trend_agreement)| PredictionView {
            date: p.date,
            actual: p.actual,
            prediction: p.prediction,
            trend_agreement,
        })
        .collect()
}
