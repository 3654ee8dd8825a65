#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use otpauth::config::AuthConfig;
use otpauth::notify::{Notifier, NotifyError};
use otpauth::rate_limit::InMemoryRateLimiter;
use otpauth::repo::inmem::InMemRepo;
use otpauth::service::Clock;
use otpauth::session::SessionIssuer;
use otpauth::AuthService;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

/// Records every delivery so tests can read the passcode a user would have received.
#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl CapturingNotifier {
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find(|(to, _)| to == email).map(|(_, c)| c.clone())
    }

    pub fn count(&self) -> usize { self.sent.lock().unwrap().len() }
}

#[async_trait::async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, recipient: &str, code: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((recipient.to_string(), code.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp down".into()));
        }
        Ok(())
    }
}

/// Manually advanced clock shared with the service under test.
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    pub fn new() -> Self { Self(Arc::new(Mutex::new(Utc::now()))) }
    pub fn now(&self) -> DateTime<Utc> { *self.0.lock().unwrap() }
    pub fn set(&self, t: DateTime<Utc>) { *self.0.lock().unwrap() = t; }
    pub fn advance(&self, d: chrono::Duration) { let mut t = self.0.lock().unwrap(); *t += d; }
    pub fn clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}

pub struct Harness {
    pub service: Arc<AuthService>,
    pub repo: InMemRepo,
    pub notifier: Arc<CapturingNotifier>,
    pub clock: TestClock,
}

pub fn harness(cfg: AuthConfig) -> Harness { build(cfg, InMemRepo::new()) }

/// Harness over an existing store, so several services can share state.
pub fn harness_with_repo(repo: InMemRepo) -> Harness { build(AuthConfig::default(), repo) }

fn build(cfg: AuthConfig, repo: InMemRepo) -> Harness {
    let notifier = Arc::new(CapturingNotifier::default());
    let clock = TestClock::new();
    let limiter = InMemoryRateLimiter::new(cfg.rate_limit_count, cfg.rate_limit_window);
    let sessions = SessionIssuer::new(SECRET.as_bytes(), cfg.session_ttl);
    let service = AuthService::new(Arc::new(repo.clone()), Arc::new(limiter), notifier.clone(), sessions, cfg)
        .with_clock(clock.clock());
    Harness { service: Arc::new(service), repo, notifier, clock }
}

pub fn default_harness() -> Harness { harness(AuthConfig::default()) }
