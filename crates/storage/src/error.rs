use shared::protocol::{MalformedRevision, Revision};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document '{id}' not found")]
    NotFound { id: String },
    #[error("document '{id}' was modified concurrently: supplied revision is stale")]
    Conflict { id: String },
    #[error("invalid database name '{0}'")]
    InvalidDatabaseName(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store rejected request: {0}")]
    Remote(String),
    #[error("sqlite failure: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("sqlite migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("document payload is not valid json: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("revision '{0}' has no successor generation")]
    GenerationOverflow(Revision),
    #[error(transparent)]
    MalformedRevision(#[from] MalformedRevision),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// True when the store could not be reached at all, as opposed to refusing
    /// or failing a request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
