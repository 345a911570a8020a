use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::{errors::UserError, repo_types::User};

/// Persistence boundary for users. Implementations must enforce login
/// uniqueness themselves and report a clash as `UserError::DuplicateLogin`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<User>, UserError>;

    async fn get_by_login(&self, login: &str) -> Result<Option<User>, UserError>;

    /// All users ordered by id.
    async fn list(&self) -> Result<Vec<User>, UserError>;

    /// Inserts when `user.is_new()`, otherwise overwrites the row with the
    /// same id. Returns `None` when there is no such row to overwrite.
    async fn save(&self, user: User) -> Result<Option<User>, UserError>;

    /// Administrative reset. Returns the number of removed users.
    async fn delete_all(&self) -> Result<u64, UserError>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(e: sqlx::Error, what: &'static str) -> UserError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => UserError::DuplicateLogin,
        _ => UserError::Internal(anyhow::Error::new(e).context(what)),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get(&self, id: i64) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, login, password_hash, photo, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get user by id")?;
        Ok(user)
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, login, password_hash, photo, created_at
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.db)
        .await
        .context("get user by login")?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, UserError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, login, password_hash, photo, created_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }

    async fn save(&self, user: User) -> Result<Option<User>, UserError> {
        if user.is_new() {
            let created = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (name, login, password_hash, photo)
                VALUES ($1, $2, $3, $4)
                RETURNING id, name, login, password_hash, photo, created_at
                "#,
            )
            .bind(&user.name)
            .bind(&user.login)
            .bind(&user.password_hash)
            .bind(&user.photo)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_write_error(e, "insert user"))?;
            return Ok(Some(created));
        }

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2, login = $3, password_hash = $4, photo = $5
            WHERE id = $1
            RETURNING id, name, login, password_hash, photo, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(&user.photo)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?;
        Ok(updated)
    }

    async fn delete_all(&self) -> Result<u64, UserError> {
        let res = sqlx::query("DELETE FROM users")
            .execute(&self.db)
            .await
            .context("delete all users")?;
        Ok(res.rows_affected())
    }
}
