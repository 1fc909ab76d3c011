use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Payload of `auth.register`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Payload of `auth.login`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload of `auth.verify.token`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Reply for all three subjects.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

/// User projection: everything except the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            created_at: u.created_at,
        }
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

impl RegisterRequest {
    /// Normalizes in place and returns the first rule that fails.
    pub fn validate(&mut self) -> Result<(), &'static str> {
        self.email = normalize_email(&self.email);
        self.name = self.name.trim().to_string();
        if !is_valid_email(&self.email) {
            return Err("Invalid email");
        }
        if self.name.is_empty() {
            return Err("Name is required");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err("Password too short");
        }
        Ok(())
    }
}

impl LoginRequest {
    pub fn validate(&mut self) -> Result<(), &'static str> {
        self.email = normalize_email(&self.email);
        if !is_valid_email(&self.email) {
            return Err("Invalid email");
        }
        if self.password.is_empty() {
            return Err("Password is required");
        }
        Ok(())
    }
}

impl VerifyTokenRequest {
    pub fn validate(&mut self) -> Result<(), &'static str> {
        self.token = self.token.trim().to_string();
        if self.token.is_empty() {
            return Err("Token is required");
        }
        Ok(())
    }
}
