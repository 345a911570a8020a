use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{errors::UserError, repo::UserStore, repo_types::User};

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    users: BTreeMap<i64, User>,
}

/// Process-local store used when no database is configured and in tests.
/// The uniqueness check and the write happen under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, id: i64) -> Result<Option<User>, UserError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>, UserError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.login == login).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, UserError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn save(&self, mut user: User) -> Result<Option<User>, UserError> {
        let mut inner = self.inner.write().await;

        if inner
            .users
            .values()
            .any(|u| u.login == user.login && u.id != user.id)
        {
            return Err(UserError::DuplicateLogin);
        }

        if user.is_new() {
            inner.last_id += 1;
            user.id = inner.last_id;
            inner.users.insert(user.id, user.clone());
            return Ok(Some(user));
        }

        match inner.users.get_mut(&user.id) {
            Some(existing) => {
                // created_at belongs to the stored row
                user.created_at = existing.created_at;
                *existing = user.clone();
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn delete_all(&self) -> Result<u64, UserError> {
        let mut inner = self.inner.write().await;
        let removed = inner.users.len() as u64;
        inner.users.clear();
        Ok(removed)
    }
}
