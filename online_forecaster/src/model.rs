use data_ingestion::config::ModelConfig;
use feature_processing::{FeatureVector, NUM_FEATURES};
use serde::{Deserialize, Serialize};

use crate::engine::OnlineModel;

const GRADIENT_CLIP: f64 = 1e12;

/// Running per-feature mean and variance (Welford).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningScaler {
    count: u64,
    means: [f64; NUM_FEATURES],
    m2: [f64; NUM_FEATURES],
}

impl RunningScaler {
    pub fn learn(&mut self, x: &[f64; NUM_FEATURES]) {
        self.count += 1;
        let n = self.count as f64;
        for (j, value) in x.iter().enumerate() {
            let delta = value - self.means[j];
            self.means[j] += delta / n;
            self.m2[j] += delta * (value - self.means[j]);
        }
    }

    /// Zero-mean, unit-variance transform. A feature with no spread yet maps to 0.
    pub fn transform(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut out = [0.0; NUM_FEATURES];
        if self.count == 0 {
            return out;
        }
        let n = self.count as f64;
        for (j, value) in x.iter().enumerate() {
            let std = (self.m2[j] / n).sqrt();
            if std > 0.0 {
                out[j] = (value - self.means[j]) / std;
            }
        }
        out
    }
}

/// Standardised linear regression fitted by stochastic gradient descent on squared loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineLinearRegression {
    scaler: RunningScaler,
    weights: [f64; NUM_FEATURES],
    intercept: f64,
    learning_rate: f64,
    intercept_lr: f64,
    l2: f64,
    seen: u64,
}

impl OnlineLinearRegression {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            scaler: RunningScaler::default(),
            weights: [0.0; NUM_FEATURES],
            intercept: 0.0,
            learning_rate: config.learning_rate,
            intercept_lr: config.intercept_lr,
            l2: config.l2,
            seen: 0,
        }
    }

    /// Number of labelled rows learned so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    fn raw_predict(&self, z: &[f64; NUM_FEATURES]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(z.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

impl Default for OnlineLinearRegression {
    fn default() -> Self {
        Self::new(&ModelConfig::default())
    }
}

impl OnlineModel for OnlineLinearRegression {
    fn predict_one(&self, features: &FeatureVector) -> f64 {
        let z = self.scaler.transform(&features.to_array());
        self.raw_predict(&z)
    }

    fn learn_one(&mut self, features: &FeatureVector, label: f64) {
        let x = features.to_array();
        self.scaler.learn(&x);
        let z = self.scaler.transform(&x);

        let error = self.raw_predict(&z) - label;
        let gradient = (2.0 * error).clamp(-GRADIENT_CLIP, GRADIENT_CLIP);

        for (w, zj) in self.weights.iter_mut().zip(z.iter()) {
            *w -= self.learning_rate * (gradient * zj + self.l2 * *w);
        }
        self.intercept -= self.intercept_lr * gradient;
        self.seen += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(prev_close: f64, day: f64) -> FeatureVector {
        FeatureVector {
            year: 2024.0,
            month: 1.0,
            day_of_week: day,
            prev_close,
            ma_short: prev_close,
            ma_long: prev_close,
            std_short: 1.0,
            momentum: 0.0,
        }
    }

    #[test]
    fn test_fresh_model_predicts_zero() {
        let model = OnlineLinearRegression::default();
        assert_eq!(model.predict_one(&features(100.0, 1.0)), 0.0);
        assert_eq!(model.seen(), 0);
    }

    #[test]
    fn test_predict_does_not_mutate() {
        let mut model = OnlineLinearRegression::default();
        model.learn_one(&features(100.0, 1.0), 101.0);
        model.learn_one(&features(102.0, 2.0), 103.0);

        let snapshot = model.clone();
        let a = model.predict_one(&features(104.0, 3.0));
        let b = model.predict_one(&features(104.0, 3.0));
        assert_eq!(a, b);
        assert_eq!(model, snapshot);
    }

    #[test]
    fn test_learns_linear_relation() {
        let mut model = OnlineLinearRegression::new(&ModelConfig {
            learning_rate: 0.05,
            intercept_lr: 0.05,
            l2: 0.0,
        });

        for step in 0..3000 {
            let x = 100.0 + (step % 40) as f64;
            model.learn_one(&features(x, (step % 5) as f64), x + 1.0);
        }

        let estimate = model.predict_one(&features(120.0, 2.0));
        assert!((estimate - 121.0).abs() < 1.0, "estimate {estimate}");
        assert_eq!(model.seen(), 3000);
    }

    #[test]
    fn test_scaler_zero_variance_maps_to_zero() {
        let mut scaler = RunningScaler::default();
        let x = features(100.0, 1.0).to_array();
        scaler.learn(&x);
        scaler.learn(&x);
        assert_eq!(scaler.transform(&x), [0.0; NUM_FEATURES]);
    }
}
