use data_ingestion::StoreError;
use feature_processing::FeatureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnerError {
    #[error("Model state codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Stored model state has version {found}, expected {expected}")]
    IncompatibleState { found: u32, expected: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Learner error: {0}")]
    Learner(#[from] LearnerError),
}

impl CycleError {
    /// Store connectivity failures clear up on their own; anything else is a defect
    /// in the data or in persisted state.
    pub fn is_transient(&self) -> bool {
        match self {
            CycleError::Store(e) | CycleError::Learner(LearnerError::Store(e)) => e.is_transient(),
            _ => false,
        }
    }
}
