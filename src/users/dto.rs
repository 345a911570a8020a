use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::User;

/// Request body for registration. Missing strings become empty and are
/// reported by validation rather than by the JSON extractor.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for update. Only `id` is required; absent fields keep
/// their stored value.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub id: i64,
    pub name: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    pub photo: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub login: String,
    pub photo: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            login: u.login,
            photo: u.photo,
            created_at: u.created_at,
        }
    }
}

/// Response returned after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: i64,
    pub name: String,
    pub login: String,
    pub photo: Option<String>,
    pub token: String,
}
