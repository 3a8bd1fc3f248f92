//! Input rules applied before any store access.

use lazy_static::lazy_static;
use regex::Regex;

use super::dto::{LoginRequest, RegisterRequest};
use crate::error::FieldViolation;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
// Matches the `users.email` column width.
pub const EMAIL_MAX: usize = 254;
pub const PASSWORD_MIN: usize = 8;
// Argon2 accepts far more, this keeps hashing cost bounded per request.
pub const PASSWORD_MAX: usize = 128;

/// Registration input after trimming and email normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn validate_registration(req: &RegisterRequest) -> Result<Registration, Vec<FieldViolation>> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let mut violations = Vec::new();

    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        violations.push(FieldViolation::new(
            "username",
            "username must be between 3 and 30 characters",
        ));
    }
    if !username.is_empty() && !USERNAME_RE.is_match(&username) {
        violations.push(FieldViolation::new(
            "username",
            "username may only contain letters, digits, hyphens and underscores",
        ));
    }

    if email.chars().count() > EMAIL_MAX {
        violations.push(FieldViolation::new(
            "email",
            "email must be at most 254 characters",
        ));
    } else if !is_valid_email(&email) {
        violations.push(FieldViolation::new("email", "invalid email"));
    }

    violations.extend(password_violations(&req.password));

    if violations.is_empty() {
        Ok(Registration {
            username,
            email,
            password: req.password.clone(),
        })
    } else {
        Err(violations)
    }
}

fn password_violations(password: &str) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        out.push(FieldViolation::new(
            "password",
            "password must be at least 8 characters",
        ));
    }
    if len > PASSWORD_MAX {
        out.push(FieldViolation::new(
            "password",
            "password must be at most 128 characters",
        ));
    }
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if !(lower && upper && digit) {
        out.push(FieldViolation::new(
            "password",
            "password must contain an uppercase letter, a lowercase letter and a digit",
        ));
    }
    out
}

pub fn validate_login(req: &LoginRequest) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();
    if req.username.trim().is_empty() {
        violations.push(FieldViolation::new("username", "username is required"));
    }
    if req.password.is_empty() {
        violations.push(FieldViolation::new("password", "password is required"));
    }
    if req.password.chars().count() > PASSWORD_MAX {
        violations.push(FieldViolation::new(
            "password",
            "password must be at most 128 characters",
        ));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
