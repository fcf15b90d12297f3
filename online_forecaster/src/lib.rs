pub mod engine;
pub mod error;
pub mod export;
pub mod misc;
pub mod model;
pub mod reader;
pub mod recorder;
pub mod scheduler;
pub mod server;
pub mod trend;
pub mod watermark;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Learner, OnlineModel, test_then_train};
pub use error::{CycleError, LearnerError};
pub use model::OnlineLinearRegression;
pub use scheduler::{CycleOutcome, CycleScheduler, CycleState};
