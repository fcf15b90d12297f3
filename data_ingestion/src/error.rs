use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error("Duplicate prediction for {instrument_id} on {date}")]
    DuplicatePrediction { instrument_id: String, date: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Connection and I/O failures may clear up on a later attempt. Constraint
    /// violations and unreadable rows repeat until the data is fixed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) | StoreError::Io(_) => true,
            StoreError::CorruptRow { .. } | StoreError::DuplicatePrediction { .. } => false,
            StoreError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => {
                    !(db.is_unique_violation()
                        || db.is_foreign_key_violation()
                        || db.is_check_violation())
                }
                _ => false,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column {0:?} in price file")]
    MissingColumn(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
