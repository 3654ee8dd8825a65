use std::time::Duration;

use actix_web::{http::header, HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::repo::RepoError;
use crate::session::SessionError;
use crate::validate::ValidationError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Outcome taxonomy of the three auth operations.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error("this email is already registered")] AlreadyRegistered,
    #[error("no user found with this email")] UserNotFound,
    #[error("too many passcode requests, retry in {}s", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },
    #[error("invalid email or passcode")] InvalidOrExpired,
    #[error("store unavailable, try again")] TransientStoreFailure,
    #[error("session signing failed")] SigningFailure,
    #[error("server misconfigured: {0}")] Misconfigured(&'static str),
}

/// Whole seconds, rounded up so a client never retries early.
fn retry_after_secs(d: &Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(ValidationError::InvalidEmail) => "InvalidEmail",
            AuthError::Validation(_) => "ValidationError",
            AuthError::AlreadyRegistered => "AlreadyRegistered",
            AuthError::UserNotFound => "UserNotFound",
            AuthError::RateLimited { .. } => "RateLimited",
            AuthError::InvalidOrExpired => "InvalidOrExpired",
            AuthError::TransientStoreFailure => "TransientStoreFailure",
            AuthError::SigningFailure => "SigningFailure",
            AuthError::Misconfigured(_) => "Misconfigured",
        }
    }
}

impl From<RepoError> for AuthError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => AuthError::AlreadyRegistered,
            // a missing row inside a unit of work means the lookup raced a concurrent change
            RepoError::NotFound => AuthError::InvalidOrExpired,
            RepoError::Internal(msg) => {
                tracing::warn!(error = %msg, "store failure");
                AuthError::TransientStoreFailure
            }
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        tracing::error!(error = %e, "session token could not be signed");
        AuthError::SigningFailure
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AuthError::Validation(_) | AuthError::AlreadyRegistered | AuthError::InvalidOrExpired => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::TransientStoreFailure => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::SigningFailure | AuthError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let retry_after_seconds = match self {
            AuthError::RateLimited { retry_after } => Some(retry_after_secs(retry_after)),
            _ => None,
        };
        let mut resp = HttpResponse::build(self.status_code());
        if let Some(secs) = retry_after_seconds {
            resp.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        resp.json(ApiErrorBody { error: self.code().to_string(), message: self.to_string(), retry_after_seconds })
    }
}
