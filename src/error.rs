use thiserror::Error;

pub type Result<T> = std::result::Result<T, TicketingError>;

#[derive(Error, Debug)]
pub enum TicketingError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient balance")]
    InsufficientFunds,
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TicketingError {
    /// Whether a queued message failing with this error should be redelivered.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TicketingError::Persistence(_) | TicketingError::Io(_) | TicketingError::Internal(_)
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        TicketingError::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for TicketingError {
    fn from(err: serde_json::Error) -> Self {
        TicketingError::Internal(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for TicketingError {
    fn from(err: rocksdb::Error) -> Self {
        TicketingError::Persistence(err.to_string())
    }
}
