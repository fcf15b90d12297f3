use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const ENV_PREFIX: &str = "FORECAST";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub instrument_id: String,
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

/// Trailing window lengths, counted in observations.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    #[serde(default = "default_momentum_period")]
    pub momentum_period: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_learning_rate")]
    pub intercept_lr: f64,
    #[serde(default)]
    pub l2: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    pub csv_path: Option<String>,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_price_column")]
    pub price_column: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_path")]
    pub path: String,
}

fn default_cycle_interval_secs() -> u64 {
    3600
}

fn default_short_window() -> usize {
    5
}

fn default_long_window() -> usize {
    10
}

fn default_momentum_period() -> usize {
    5
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_date_column() -> String {
    "Date".to_string()
}

fn default_price_column() -> String {
    "Adj Close".to_string()
}

fn default_export_path() -> String {
    "data/results/predictions.csv".to_string()
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            momentum_period: default_momentum_period(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            intercept_lr: default_learning_rate(),
            l2: 0.0,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            date_column: default_date_column(),
            price_column: default_price_column(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

impl AppConfig {
    /// Reads `path` (if it exists) and then `FORECAST_*` environment overrides,
    /// e.g. `FORECAST_DATABASE__URL`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url must not be empty"));
        }
        if self.pipeline.instrument_id.trim().is_empty() {
            return Err(invalid("pipeline.instrument_id must not be empty"));
        }
        if self.pipeline.cycle_interval_secs == 0 {
            return Err(invalid("pipeline.cycle_interval_secs must be positive"));
        }

        let f = &self.features;
        if f.short_window < 2 {
            return Err(invalid("features.short_window must be at least 2"));
        }
        if f.long_window < f.short_window {
            return Err(invalid("features.long_window must not be shorter than short_window"));
        }
        if f.momentum_period == 0 {
            return Err(invalid("features.momentum_period must be positive"));
        }

        let m = &self.model;
        if !(m.learning_rate.is_finite() && m.learning_rate > 0.0) {
            return Err(invalid("model.learning_rate must be a positive number"));
        }
        if !(m.intercept_lr.is_finite() && m.intercept_lr > 0.0) {
            return Err(invalid("model.intercept_lr must be a positive number"));
        }
        if !(m.l2.is_finite() && m.l2 >= 0.0) {
            return Err(invalid("model.l2 must be a non-negative number"));
        }

        Ok(())
    }

    /// Price file for the configured instrument, `data/input/<instrument>.csv` unless overridden.
    pub fn csv_path(&self) -> String {
        self.ingestion
            .csv_path
            .clone()
            .unwrap_or_else(|| format!("data/input/{}.csv", self.pipeline.instrument_id))
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Message(msg.to_string())
}
