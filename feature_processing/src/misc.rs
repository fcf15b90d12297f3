use chrono::NaiveDate;
use data_ingestion::config::FeatureConfig;
use serde::{Deserialize, Serialize};

pub const NUM_FEATURES: usize = 8;

/// Features of one observation. Every trailing statistic is computed from strictly earlier rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub year: f64,
    pub month: f64,
    /// Monday = 0
    pub day_of_week: f64,
    pub prev_close: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub std_short: f64,
    pub momentum: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.year,
            self.month,
            self.day_of_week,
            self.prev_close,
            self.ma_short,
            self.ma_long,
            self.std_short,
            self.momentum,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub features: FeatureVector,
    pub label: f64,
}

/// Date-ordered feature rows of one cycle.
///
/// Finite and consumed once: it is an iterator, not a collection, and cannot be cloned.
#[derive(Debug)]
pub struct FeatureRows {
    rows: std::vec::IntoIter<FeatureRow>,
}

impl FeatureRows {
    pub(crate) fn new(rows: Vec<FeatureRow>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.as_slice().is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Keeps only rows dated strictly after `watermark`.
    pub fn after(self, watermark: Option<NaiveDate>) -> Self {
        match watermark {
            None => self,
            Some(watermark) => Self::new(self.rows.filter(|r| r.date > watermark).collect()),
        }
    }
}

impl Iterator for FeatureRows {
    type Item = FeatureRow;

    fn next(&mut self) -> Option<FeatureRow> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for FeatureRows {}

/// Window lengths of the trailing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureWindows {
    pub short: usize,
    pub long: usize,
    pub momentum: usize,
}

impl FeatureWindows {
    /// Number of earlier observations a row needs before all its statistics exist.
    /// Also the number of leading rows dropped from a cold-start window.
    pub fn max_lookback(&self) -> usize {
        self.short.max(self.long).max(self.momentum + 1)
    }
}

impl Default for FeatureWindows {
    fn default() -> Self {
        Self {
            short: 5,
            long: 10,
            momentum: 5,
        }
    }
}

impl From<&FeatureConfig> for FeatureWindows {
    fn from(cfg: &FeatureConfig) -> Self {
        Self {
            short: cfg.short_window,
            long: cfg.long_window,
            momentum: cfg.momentum_period,
        }
    }
}
