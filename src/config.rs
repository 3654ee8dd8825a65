use std::time::Duration;

use anyhow::{bail, Context};

pub const MIN_SECRET_LEN: usize = 32;
pub const MAX_OTP_EXPIRY_MINUTES: i64 = 24 * 60;
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Tunables for passcode issuance, rate limiting and sessions, read from env.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub otp_length: usize,
    pub otp_ttl: chrono::Duration,
    pub rate_limit_count: u32,
    pub rate_limit_window: Duration,
    pub session_ttl: chrono::Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            otp_length: 6,
            otp_ttl: chrono::Duration::minutes(5),
            rate_limit_count: 3,
            rate_limit_window: Duration::from_secs(60),
            session_ttl: chrono::Duration::minutes(60),
            store_timeout: Duration::from_millis(5000),
            notify_timeout: Duration::from_millis(5000),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) => v.trim().parse().with_context(|| format!("{name} has an invalid value '{v}'")),
        Err(_) => Ok(default),
    }
}

fn minutes_env(name: &str, default: i64, max: i64) -> anyhow::Result<chrono::Duration> {
    let n: i64 = parse_env(name, default)?;
    if !(1..=max).contains(&n) {
        bail!("{name} must be between 1 and {max}, got {n}");
    }
    chrono::Duration::try_minutes(n).with_context(|| format!("{name} is out of range"))
}

impl AuthConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let otp_length: usize = parse_env("OTP_LENGTH", d.otp_length)?;
        if !(4..=10).contains(&otp_length) {
            bail!("OTP_LENGTH must be between 4 and 10, got {otp_length}");
        }
        let otp_ttl = minutes_env("OTP_EXPIRY_MINUTES", 5, MAX_OTP_EXPIRY_MINUTES)?;
        let session_ttl = minutes_env("SESSION_TOKEN_TTL_MINUTES", 60, MAX_SESSION_TTL_MINUTES)?;
        let rate_limit_count: u32 = parse_env("OTP_RATE_LIMIT_COUNT", d.rate_limit_count)?;
        if rate_limit_count == 0 {
            bail!("OTP_RATE_LIMIT_COUNT must be positive");
        }
        let window_secs: u64 = parse_env("OTP_RATE_LIMIT_WINDOW_SECONDS", 60)?;
        if window_secs == 0 {
            bail!("OTP_RATE_LIMIT_WINDOW_SECONDS must be positive");
        }
        Ok(Self {
            otp_length,
            otp_ttl,
            rate_limit_count,
            rate_limit_window: Duration::from_secs(window_secs),
            session_ttl,
            store_timeout: Duration::from_millis(parse_env("STORE_TIMEOUT_MS", 5000)?),
            notify_timeout: Duration::from_millis(parse_env("NOTIFY_TIMEOUT_MS", 5000)?),
        })
    }
}

/// Reads `SIGNING_SECRET`; kept out of `AuthConfig` so it never lands in a Debug print.
pub fn signing_secret_from_env() -> anyhow::Result<String> {
    let secret = std::env::var("SIGNING_SECRET").context("SIGNING_SECRET must be set")?;
    if secret.len() < MIN_SECRET_LEN {
        bail!("SIGNING_SECRET must be at least {MIN_SECRET_LEN} bytes long");
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "OTP_LENGTH", "OTP_EXPIRY_MINUTES", "OTP_RATE_LIMIT_COUNT", "OTP_RATE_LIMIT_WINDOW_SECONDS",
        "SESSION_TOKEN_TTL_MINUTES", "STORE_TIMEOUT_MS", "NOTIFY_TIMEOUT_MS", "SIGNING_SECRET",
    ];

    fn clear() { for v in VARS { std::env::remove_var(v); } }

    #[test]
    #[serial_test::serial]
    fn defaults_when_unset() {
        clear();
        let c = AuthConfig::from_env().unwrap();
        assert_eq!(c.otp_length, 6);
        assert_eq!(c.session_ttl, chrono::Duration::minutes(60));
        assert_eq!(c.rate_limit_count, 3);
    }

    #[test]
    #[serial_test::serial]
    fn overrides_and_rejects() {
        clear();
        std::env::set_var("OTP_LENGTH", "8");
        std::env::set_var("OTP_RATE_LIMIT_WINDOW_SECONDS", "120");
        let c = AuthConfig::from_env().unwrap();
        assert_eq!(c.otp_length, 8);
        assert_eq!(c.rate_limit_window, Duration::from_secs(120));

        std::env::set_var("OTP_LENGTH", "two");
        let err = AuthConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OTP_LENGTH"));
        std::env::set_var("OTP_LENGTH", "3");
        assert!(AuthConfig::from_env().is_err());
        clear();
    }

    #[test]
    #[serial_test::serial]
    fn ttl_bounds_enforced() {
        clear();
        std::env::set_var("OTP_EXPIRY_MINUTES", "1000000000000");
        let err = AuthConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OTP_EXPIRY_MINUTES"));

        std::env::set_var("OTP_EXPIRY_MINUTES", "0");
        assert!(AuthConfig::from_env().is_err());

        std::env::set_var("OTP_EXPIRY_MINUTES", MAX_OTP_EXPIRY_MINUTES.to_string());
        std::env::set_var("SESSION_TOKEN_TTL_MINUTES", "9000000000000000");
        let err = AuthConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SESSION_TOKEN_TTL_MINUTES"));

        std::env::set_var("SESSION_TOKEN_TTL_MINUTES", MAX_SESSION_TTL_MINUTES.to_string());
        let c = AuthConfig::from_env().unwrap();
        assert_eq!(c.otp_ttl, chrono::Duration::days(1));
        assert_eq!(c.session_ttl, chrono::Duration::days(30));
        clear();
    }

    #[test]
    #[serial_test::serial]
    fn zero_rate_limit_count_rejected() {
        clear();
        std::env::set_var("OTP_RATE_LIMIT_COUNT", "0");
        let err = AuthConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OTP_RATE_LIMIT_COUNT"));
        std::env::set_var("OTP_RATE_LIMIT_COUNT", "1");
        assert_eq!(AuthConfig::from_env().unwrap().rate_limit_count, 1);
        clear();
    }

    #[test]
    #[serial_test::serial]
    fn secret_length_enforced() {
        clear();
        assert!(signing_secret_from_env().is_err());
        std::env::set_var("SIGNING_SECRET", "short");
        assert!(signing_secret_from_env().is_err());
        std::env::set_var("SIGNING_SECRET", "x".repeat(MIN_SECRET_LEN));
        assert!(signing_secret_from_env().is_ok());
        clear();
    }
}
