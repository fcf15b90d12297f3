//! Trend agreement between actual and predicted moves, relative to the previous day's close.
//! Pure functions over prediction history; nothing here feeds back into the loop.

use data_ingestion::misc::Prediction;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendAgreement {
    AgreeUp,
    AgreeDown,
    Disagree,
}

impl fmt::Display for TrendAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendAgreement::AgreeUp => "Agree (Up)",
            TrendAgreement::AgreeDown => "Agree (Down)",
            TrendAgreement::Disagree => "Disagree",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outlook {
    Up,
    Down,
}

pub fn classify(prev_actual: f64, actual: f64, prediction: f64) -> TrendAgreement {
    if actual > prev_actual && prediction > prev_actual {
        TrendAgreement::AgreeUp
    } else if actual < prev_actual && prediction < prev_actual {
        TrendAgreement::AgreeDown
    } else {
        TrendAgreement::Disagree
    }
}

/// Labels each prediction against the previous row's actual. The first row has no label.
pub fn label_history(history: &[Prediction]) -> Vec<Option<TrendAgreement>> {
    let mut labels = Vec::with_capacity(history.len());
    let mut prev_actual: Option<f64> = None;

    for p in history {
        labels.push(prev_actual.map(|prev| classify(prev, p.actual, p.prediction)));
        prev_actual = Some(p.actual);
    }
    labels
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub agree_up: usize,
    pub agree_down: usize,
    pub disagree: usize,
    pub latest: Option<TrendAgreement>,
    pub outlook: Option<Outlook>,
}

pub fn summarize(history: &[Prediction]) -> TrendSummary {
    let labels: Vec<_> = label_history(history).into_iter().flatten().collect();
    let count = |wanted: TrendAgreement| labels.iter().filter(|l| **l == wanted).count();

    TrendSummary {
        agree_up: count(TrendAgreement::AgreeUp),
        agree_down: count(TrendAgreement::AgreeDown),
        disagree: count(TrendAgreement::Disagree),
        latest: if history.len() > 1 {
            labels.last().copied()
        } else {
            None
        },
        outlook: history.last().map(|p| {
            if p.prediction > p.actual {
                Outlook::Up
            } else {
                Outlook::Down
            }
        }),
    }
}
