use data_ingestion::misc::Prediction;
use serde::Serialize;
use std::io::Write;

use crate::trend::label_history;

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Actual")]
    actual: f64,
    #[serde(rename = "Prediction")]
    prediction: f64,
    #[serde(rename = "Trend Agreement")]
    trend_agreement: &'a str,
}

/// Writes the prediction history as CSV, oldest first. Returns the number of data rows.
pub fn write_predictions_csv<W: Write>(out: W, history: &[Prediction]) -> csv::Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let labels = label_history(history);

    for (p, label) in history.iter().zip(labels) {
        let label = label.map(|l| l.to_string()).unwrap_or_default();
        writer.serialize(ExportRow {
            date: p.date.to_string(),
            actual: p.actual,
            prediction: p.prediction,
            trend_agreement: &label,
        })?;
    }

    writer.flush()?;
    Ok(history.len())
}
