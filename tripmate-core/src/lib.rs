pub mod events;
pub mod memory;
pub mod payment;
pub mod repository;
pub mod request;
pub mod user;

pub use events::{ChangeFeed, RequestChange};
pub use request::{RequestStatus, TravelRequest};
pub use user::{GuideProfile, OnboardingState, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("External service error: {0}")]
    ExternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
