//! Input checks run before any store call.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

const MAX_EMAIL_LEN: usize = 254;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("enter a valid email address")] InvalidEmail,
    #[error("passcode must be {0} digits")] InvalidCodeFormat(usize),
    #[error("malformed request: {0}")] MalformedBody(String),
}

/// Trims and lower-cases so registration and every later lookup agree on identity.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

pub fn check_code(raw: &str, length: usize) -> Result<&str, ValidationError> {
    let code = raw.trim();
    if code.len() != length || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidCodeFormat(length));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  A@X.com ").unwrap(), "a@x.com");
    }

    #[test]
    fn bad_emails_rejected() {
        for e in ["", "no-at", "a@b", "a b@x.com", "@x.com"] {
            assert_eq!(normalize_email(e), Err(ValidationError::InvalidEmail), "{e}");
        }
        let long = format!("{}@x.com", "a".repeat(260));
        assert!(normalize_email(&long).is_err());
    }

    #[test]
    fn code_shape() {
        assert_eq!(check_code(" 012345 ", 6).unwrap(), "012345");
        assert!(check_code("12345", 6).is_err());
        assert!(check_code("12345a", 6).is_err());
        assert!(check_code("１２３４５６", 6).is_err());
    }
}
