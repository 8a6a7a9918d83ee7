//! Error taxonomy for the dispatch core.
//!
//! Validation and authorization failures are returned synchronously to the
//! caller. Lost races surface to the affected client as a non-alarming
//! channel event, not through this type. Notifier failures never become a
//! [DispatchError]; they are logged and counted.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Malformed input; nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested transition is not legal from the entity's current state.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// The actor already has a live entity that excludes this one
    /// (e.g. a second concurrent ride for the same rider).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The ride was assigned to another driver before this accept landed.
    #[error("ride no longer available")]
    RideUnavailable,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The actor is not a party to the ride or alert.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The durable store (or another upstream) could not be reached.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("rate limited")]
    RateLimited,
}

impl DispatchError {
    /// Stable machine-readable code carried on failure responses.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "VALIDATION_ERROR",
            DispatchError::InvalidTransition(_) => "INVALID_STATUS_TRANSITION",
            DispatchError::Conflict(_) => "CONFLICT",
            DispatchError::RideUnavailable => "RIDE_UNAVAILABLE",
            DispatchError::NotFound(_) => "NOT_FOUND",
            DispatchError::Authorization(_) => "AUTHORIZATION_ERROR",
            DispatchError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            DispatchError::RateLimited => "RATE_LIMITED",
        }
    }
}

impl DispatchError {
    /// Maps a store failure observed while reading or writing `entity`.
    pub fn from_store(err: StoreError, entity: &'static str) -> Self {
        match err {
            StoreError::Conflict => {
                DispatchError::InvalidTransition(format!("{entity} changed state concurrently"))
            }
            StoreError::NotFound => DispatchError::NotFound(entity),
            StoreError::Unavailable(detail) => DispatchError::Upstream(detail),
        }
    }
}
