use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;
/// Longest address accepted; fits the `VARCHAR(255)` column.
pub const EMAIL_MAX_LEN: usize = 254;

fn has_control_chars(s: &str) -> bool {
    s.chars().any(char::is_control)
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.chars().count() <= EMAIL_MAX_LEN && !has_control_chars(email) && EMAIL_RE.is_match(email)
}

/// Request body for user registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    /// Shape checks only; uniqueness is left to the store.
    pub fn validate(&self) -> Result<(), String> {
        let username_len = self.username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
            return Err(format!(
                "Username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
            ));
        }
        if has_control_chars(&self.username) {
            return Err("Username contains invalid characters".into());
        }
        if !is_valid_email(&self.email) {
            return Err("Invalid email".into());
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(format!(
                "Password must be at least {PASSWORD_MIN_LEN} characters"
            ));
        }
        if has_control_chars(&self.password) {
            return Err("Password contains invalid characters".into());
        }
        Ok(())
    }
}

/// Request body for login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// A malformed address can never match a stored user, so it is rejected
    /// as input rather than answered with the credentials error.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err("Invalid email".into());
        }
        Ok(())
    }
}

/// Response returned after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: PublicUser,
}

impl TokenResponse {
    pub fn bearer(access_token: String, user: PublicUser) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
            user,
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}
