//! Error taxonomy for matching and routing.

use thiserror::Error;

/// Failure talking to a routing provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("routing provider returned status {0}")]
    Status(u16),

    #[error("no route between {from} and {to}")]
    NoRoute { from: String, to: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Transport failures, timeouts and 5xx answers are worth another attempt.
    /// A provider that answered "no route" will answer the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(err) => !err.is_builder() && !err.is_decode(),
            ProviderError::Status(code) => *code >= 500 || *code == 429,
            ProviderError::NoRoute { .. } | ProviderError::Malformed(_) => false,
        }
    }
}

/// Failure decoding an encoded polyline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    #[error("byte {byte:#04x} at offset {offset} is outside the polyline alphabet")]
    InvalidByte { byte: u8, offset: usize },

    #[error("polyline ends in the middle of a value")]
    Truncated,

    #[error("polyline holds a latitude without its longitude")]
    UnpairedCoordinate,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("illegal transition: {0}")]
    State(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("invalid polyline: {0}")]
    InvalidPolyline(#[from] PolylineError),

    #[error("store failure: {0}")]
    Store(String),
}

impl PlannerError {
    pub fn validation(message: impl Into<String>) -> Self {
        PlannerError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PlannerError::Conflict(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        PlannerError::State(message.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        PlannerError::NotFound { entity, id }
    }
}

pub type Result<T, E = PlannerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Status(503).is_retryable());
        assert!(ProviderError::Status(429).is_retryable());
        assert!(!ProviderError::Status(400).is_retryable());
        assert!(!ProviderError::Malformed("x".into()).is_retryable());
        assert!(
            !ProviderError::NoRoute {
                from: "a".into(),
                to: "b".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn messages_name_the_entity() {
        let err = PlannerError::not_found("ride", 7);
        assert_eq!(err.to_string(), "ride 7 not found");
    }
}
