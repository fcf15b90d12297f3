pub mod config;
pub mod error;
pub mod fetcher;
pub mod logger;
pub mod memory;
pub mod misc;
pub mod sqlite;
pub mod store;

pub use error::{IngestionError, StoreError};
pub use misc::{Observation, Prediction, PredictionRow, PricePoint};
pub use store::{ModelStore, ObservationStore, PredictionStore};
