use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed or out-of-range arguments to a pure computation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A referenced entity is missing or in the wrong state for the operation to be attempted.
    #[error("validation failed: {0}")]
    ValidationError(String),
    #[error("{entity} {id} cannot move from {from} to {to}")]
    IllegalTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The data store failed to complete a read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    pub fn illegal_transition(
        entity: &'static str,
        id: Uuid,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Error::IllegalTransition {
            entity,
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
