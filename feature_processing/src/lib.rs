pub mod error;
pub mod misc;
pub mod processor;

pub use error::FeatureError;
pub use misc::{FeatureRow, FeatureRows, FeatureVector, FeatureWindows, NUM_FEATURES};
pub use processor::FeatureBuilder;
