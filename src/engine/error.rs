use thiserror::Error;

use crate::model::{BookingId, BookingStatus};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("slot conflicts with booking {0}")]
    Conflict(BookingId),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("booking {id} is already {status}")]
    InvalidState { id: BookingId, status: BookingStatus },
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl BookingError {
    pub fn resource_not_found(name: impl Into<String>) -> Self {
        BookingError::NotFound {
            kind: "resource",
            key: name.into(),
        }
    }

    pub fn booking_not_found(id: BookingId) -> Self {
        BookingError::NotFound {
            kind: "booking",
            key: id.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BookingError::InvalidRequest(msg.into())
    }

    /// Worth retrying once storage has been reinitialized.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StorageUnavailable(_))
    }
}
