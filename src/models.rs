use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub active: bool,
    pub verified: bool, // flips to true on first successful verification, never back
    pub created_at: DateTime<Utc>,
}

/// One issued passcode. Rows are never deleted; `used` is the only mutable column.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Passcode {
    pub id: Id,
    pub user_id: Id,
    #[serde(skip_serializing)]
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl Passcode {
    /// Strict comparison: a passcode presented at exactly `expires_at` is already expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewPasscode {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------- wire types -----------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    #[serde(alias = "code")]
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}
