use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::codegen;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{NewPasscode, User};
use crate::notify::Notifier;
use crate::rate_limit::{otp_request_key, RateDecision, RateLimiter};
use crate::repo::{AuthRepo, RepoError};
use crate::session::{IssuedToken, SessionIssuer};
use crate::validate::{check_code, normalize_email};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub user: User,
    pub token: IssuedToken,
}

/// Composes the store, limiter, notifier and session issuer into the three
/// public operations: register, request a passcode, verify a passcode.
pub struct AuthService {
    repo: Arc<dyn AuthRepo>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn Notifier>,
    sessions: SessionIssuer,
    cfg: AuthConfig,
    clock: Clock,
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            // the unit of work inside `fut` was dropped uncommitted, so nothing persisted
            warn!(timeout_ms = limit.as_millis() as u64, "store operation timed out");
            Err(AuthError::TransientStoreFailure)
        }
    }
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn AuthRepo>,
        limiter: Arc<dyn RateLimiter>,
        notifier: Arc<dyn Notifier>,
        sessions: SessionIssuer,
        cfg: AuthConfig,
    ) -> Self {
        Self { repo, limiter, notifier, sessions, cfg, clock: Arc::new(Utc::now) }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sessions(&self) -> &SessionIssuer { &self.sessions }

    pub fn config(&self) -> &AuthConfig { &self.cfg }

    fn now(&self) -> DateTime<Utc> { (self.clock)() }

    pub async fn register(&self, email: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        let user = bounded(self.cfg.store_timeout, async {
            Ok::<_, AuthError>(self.repo.create_user(&email, self.now()).await?)
        })
        .await?;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Issues a fresh passcode and hands it to the notifier. The code itself
    /// is never returned to the caller.
    pub async fn request_code(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        let user = bounded(self.cfg.store_timeout, async {
            Ok::<_, AuthError>(self.repo.find_user_by_email(&email).await?)
        })
        .await?
        .filter(|u| u.active)
        .ok_or(AuthError::UserNotFound)?;

        if let RateDecision::Denied { retry_after } = self.limiter.check_and_increment(&otp_request_key(&email), self.now()).await {
            warn!(user_id = user.id, retry_after_s = retry_after.as_secs(), "passcode request rate limited");
            return Err(AuthError::RateLimited { retry_after });
        }

        let code = codegen::generate(self.cfg.otp_length);
        let (passcode, superseded) = bounded(self.cfg.store_timeout, async {
            let mut uow = self.repo.begin(user.id).await.map_err(|e| match e {
                RepoError::NotFound => AuthError::UserNotFound,
                other => other.into(),
            })?;
            let now = self.now();
            let expires_at = now.checked_add_signed(self.cfg.otp_ttl).ok_or_else(|| {
                error!(user_id = user.id, "passcode expiry overflows the clock");
                AuthError::Misconfigured("passcode expiry out of range")
            })?;
            let superseded = uow.invalidate_active(now).await?;
            let passcode = uow.insert_passcode(NewPasscode { code: code.clone(), created_at: now, expires_at }).await?;
            uow.commit().await?;
            Ok::<_, AuthError>((passcode, superseded))
        })
        .await?;
        info!(user_id = user.id, passcode_id = passcode.id, superseded, "passcode issued");

        // Best effort, after commit: a failed delivery leaves the passcode valid and the user can ask again.
        match tokio::time::timeout(self.cfg.notify_timeout, self.notifier.send(&user.email, &code)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(user_id = user.id, error = %e, "passcode delivery failed"),
            Err(_) => warn!(user_id = user.id, "passcode delivery timed out"),
        }
        Ok(())
    }

    /// Consumes a matching passcode and mints a session token in the same unit
    /// of work. Unknown users and bad codes both come back as `InvalidOrExpired`.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<VerifiedSession, AuthError> {
        let email = normalize_email(email)?;
        let code = check_code(code, self.cfg.otp_length)?;
        let session = bounded(self.cfg.store_timeout, async {
            let user = self
                .repo
                .find_user_by_email(&email)
                .await?
                .filter(|u| u.active)
                .ok_or(AuthError::InvalidOrExpired)?;
            let mut uow = self.repo.begin(user.id).await?;
            if !uow.user().active {
                return Err(AuthError::InvalidOrExpired);
            }
            let now = self.now();
            let passcode = uow.find_active(code, now).await?.ok_or(AuthError::InvalidOrExpired)?;
            if !uow.consume(passcode.id).await? {
                return Err(AuthError::InvalidOrExpired);
            }
            uow.mark_verified().await?;
            let user = uow.user().clone();
            // signing failure drops `uow`, which rolls the consumption back
            let token = self.sessions.issue(&user, now)?;
            uow.commit().await?;
            Ok::<_, AuthError>(VerifiedSession { user, token })
        })
        .await;

        match session {
            Ok(s) => {
                info!(user_id = s.user.id, "passcode verified, session issued");
                Ok(s)
            }
            Err(AuthError::InvalidOrExpired) => {
                warn!("passcode verification failed");
                Err(AuthError::InvalidOrExpired)
            }
            Err(e) => Err(e),
        }
    }
}
