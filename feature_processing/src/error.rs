use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Observations out of order: {previous} is followed by {next}")]
    OutOfOrder { previous: NaiveDate, next: NaiveDate },

    #[error("Duplicate observation date {0}")]
    DuplicateDate(NaiveDate),

    #[error("Polars error: {0}")]
    PolarsError(#[from] polars::prelude::PolarsError),
}
