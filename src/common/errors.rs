use thiserror::Error;
use uuid::Uuid;

use crate::common::models::MeetStatus;

/// Recoverable errors returned across the presentation boundary.
/// None of these are fatal; the view layer decides how to surface them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("meet request {0} not found")]
    MeetNotFound(Uuid),

    #[error("participant {0} is not in the directory")]
    InvalidParticipant(Uuid),

    #[error("cannot send a meet request to yourself")]
    SelfRequest,

    #[error("a pending meet request to this user already exists")]
    DuplicateRequest,

    #[error("meet request {id} is {status:?} and cannot be {action}")]
    InvalidTransition {
        id: Uuid,
        status: MeetStatus,
        action: &'static str,
    },

    #[error("meet request {id} is {status:?}; tracking requires an accepted meet")]
    InvalidState { id: Uuid, status: MeetStatus },

    #[error("no meet is being tracked")]
    NotTracking,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired session")]
    InvalidSession,

    #[error("operation requires the super-admin role")]
    NotAuthorized,

    #[error("coordinates out of range: lat {lat}, lng {lng}")]
    InvalidLocation { lat: f64, lng: f64 },

    #[error("a user with this id or email is already registered")]
    DuplicateUser,
}
