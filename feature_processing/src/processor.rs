use chrono::Datelike;
use data_ingestion::misc::Observation;
use log::debug;
use polars::prelude::*;

use crate::error::FeatureError;
use crate::misc::{FeatureRow, FeatureRows, FeatureVector, FeatureWindows};

/// Turns a date-ordered window of observations into supervised rows.
///
/// Each trailing statistic at row `i` is computed on the price series shifted by one, so it only
/// ever sees rows `[i - k, i - 1]`. Rows whose windows are not yet full are dropped, which removes
/// exactly `max_lookback()` leading rows from any contiguous window.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    windows: FeatureWindows,
}

impl FeatureBuilder {
    pub fn new(windows: FeatureWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> FeatureWindows {
        self.windows
    }

    pub fn build(&self, observations: &[Observation]) -> Result<FeatureRows, FeatureError> {
        check_ordering(observations)?;

        if observations.len() <= self.windows.max_lookback() {
            debug!(
                "{} observations do not fill a {} row lookback, no features",
                observations.len(),
                self.windows.max_lookback()
            );
            return Ok(FeatureRows::empty());
        }

        let df = to_dataframe(observations)?;
        let stats = extract_features(df, &self.windows)?;

        let idx = stats.column("idx")?.u32()?;
        let prev_close = stats.column("prev_close")?.f64()?;
        let ma_short = stats.column("ma_short")?.f64()?;
        let ma_long = stats.column("ma_long")?.f64()?;
        let std_short = stats.column("std_short")?.f64()?;
        let momentum = stats.column("momentum")?.f64()?;

        let rows = idx
            .into_no_null_iter()
            .zip(prev_close.into_no_null_iter())
            .zip(ma_short.into_no_null_iter())
            .zip(ma_long.into_no_null_iter())
            .zip(std_short.into_no_null_iter())
            .zip(momentum.into_no_null_iter())
            .map(
                |(((((i, prev_close), ma_short), ma_long), std_short), momentum)| {
                    let obs = &observations[i as usize];
                    FeatureRow {
                        date: obs.date,
                        label: obs.price,
                        features: FeatureVector {
                            year: obs.date.year() as f64,
                            month: obs.date.month() as f64,
                            day_of_week: obs.date.weekday().num_days_from_monday() as f64,
                            prev_close,
                            ma_short,
                            ma_long,
                            std_short,
                            momentum,
                        },
                    }
                },
            )
            .collect::<Vec<_>>();

        debug!(
            "Built {} feature rows from {} observations",
            rows.len(),
            observations.len()
        );
        Ok(FeatureRows::new(rows))
    }
}

fn check_ordering(observations: &[Observation]) -> Result<(), FeatureError> {
    for pair in observations.windows(2) {
        let (previous, next) = (pair[0].date, pair[1].date);
        if next == previous {
            return Err(FeatureError::DuplicateDate(next));
        }
        if next < previous {
            return Err(FeatureError::OutOfOrder { previous, next });
        }
    }
    Ok(())
}

fn to_dataframe(observations: &[Observation]) -> PolarsResult<DataFrame> {
    let idx: Vec<u32> = (0..observations.len() as u32).collect();
    let price: Vec<f64> = observations.iter().map(|o| o.price).collect();

    let s1 = Series::new("idx", idx);
    let s2 = Series::new("price", price);
    DataFrame::new(vec![s1, s2])
}

fn full_window(size: usize) -> RollingOptions {
    RollingOptions {
        window_size: Duration::parse(&format!("{size}i")),
        min_periods: size,
        ..Default::default()
    }
}

/// Trailing statistics over the shifted price; incomplete windows stay null and are dropped.
fn extract_features(df: DataFrame, windows: &FeatureWindows) -> PolarsResult<DataFrame> {
    df.lazy()
        .with_columns([col("price").shift(lit(1)).alias("prev_close")])
        .with_columns([
            col("prev_close")
                .rolling_mean(full_window(windows.short))
                .alias("ma_short"),
            col("prev_close")
                .rolling_mean(full_window(windows.long))
                .alias("ma_long"),
            col("prev_close")
                .rolling_std(full_window(windows.short))
                .alias("std_short"),
            // prev_close minus the close `momentum` periods before it
            (col("prev_close") - col("price").shift(lit(windows.momentum as i64 + 1)))
                .alias("momentum"),
        ])
        .drop_nulls(None)
        .collect()
}
