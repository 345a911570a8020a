use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Id of a user that has not been persisted yet.
pub const UNSAVED_ID: i64 = 0;

/// User record in the store.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub photo: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// A record the store will insert and assign an id to.
    pub fn unsaved(name: String, login: String, password_hash: String, photo: Option<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            name,
            login,
            password_hash,
            photo,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == UNSAVED_ID
    }
}
