use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{
    dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
    errors::UserError,
    repo::UserStore,
    repo_types::{User, UNSAVED_ID},
    validation::{
        normalize_login, validate_login, validate_name, validate_password, validate_photo,
    },
};
use crate::auth::password::PasswordHasher;

/// Registration, authentication and maintenance of users.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    /// Verified against when the login is unknown, so both failure paths
    /// pay the same hashing cost.
    dummy_digest: Option<Arc<str>>,
}

fn normalize_photo(photo: Option<String>) -> Option<String> {
    photo
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        let dummy_digest = match hasher.hash("blog-users-dummy-password") {
            Ok(d) => Some(Arc::from(d)),
            Err(e) => {
                warn!(error = %e, "could not prepare dummy digest");
                None
            }
        };
        Self {
            store,
            hasher,
            dummy_digest,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    #[instrument(skip(self, req), fields(login = %req.login))]
    pub async fn register(&self, req: RegisterRequest) -> Result<User, UserError> {
        if req.id != UNSAVED_ID {
            return Err(UserError::validation(
                "id must be 0 or absent when registering",
            ));
        }

        let login = normalize_login(&req.login);
        validate_name(&req.name)?;
        validate_login(&login)?;
        validate_password(&req.password)?;
        validate_photo(req.photo.as_deref())?;

        if self.store.get_by_login(&login).await?.is_some() {
            warn!(%login, "login already registered");
            return Err(UserError::DuplicateLogin);
        }

        let hash = self.hasher.hash(&req.password)?;
        let candidate = User::unsaved(
            req.name.trim().to_string(),
            login,
            hash,
            normalize_photo(req.photo),
        );
        let user = self
            .store
            .save(candidate)
            .await?
            .ok_or_else(|| UserError::Internal(anyhow::anyhow!("insert returned no row")))?;

        info!(user_id = user.id, login = %user.login, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, req), fields(login = %req.login))]
    pub async fn authenticate(&self, req: &LoginRequest) -> Result<User, UserError> {
        let user = self
            .authenticate_credentials(&req.login, &req.password)
            .await?;
        info!(user_id = user.id, "user logged in");
        Ok(user)
    }

    /// Single credential check shared by the login endpoint and the
    /// protected-route extractor.
    pub async fn authenticate_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<User, UserError> {
        let login = normalize_login(login);
        let Some(user) = self.store.get_by_login(&login).await? else {
            if let Some(digest) = &self.dummy_digest {
                let _ = self.hasher.verify(password, digest);
            }
            warn!(%login, "unknown login");
            return Err(UserError::Unauthorized);
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(%login, user_id = user.id, "invalid password");
            return Err(UserError::Unauthorized);
        }
        Ok(user)
    }

    #[instrument(skip(self, req), fields(user_id = req.id))]
    pub async fn update(&self, req: UpdateUserRequest) -> Result<User, UserError> {
        let mut user = self.store.get(req.id).await?.ok_or(UserError::NotFound)?;

        if let Some(name) = req.name {
            validate_name(&name)?;
            user.name = name.trim().to_string();
        }

        if let Some(login) = req.login {
            let login = normalize_login(&login);
            validate_login(&login)?;
            if login != user.login {
                if let Some(other) = self.store.get_by_login(&login).await? {
                    if other.id != user.id {
                        warn!(%login, other_id = other.id, "login taken by another user");
                        return Err(UserError::DuplicateLogin);
                    }
                }
            }
            user.login = login;
        }

        if let Some(password) = req.password {
            validate_password(&password)?;
            user.password_hash = self.hasher.hash(&password)?;
        }

        if req.photo.is_some() {
            validate_photo(req.photo.as_deref())?;
            user.photo = normalize_photo(req.photo);
        }

        // None here means the row was removed after the lookup above.
        let saved = self.store.save(user).await?.ok_or(UserError::NotFound)?;
        info!(user_id = saved.id, "user updated");
        Ok(saved)
    }

    pub async fn list_all(&self) -> Result<Vec<User>, UserError> {
        self.store.list().await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserError> {
        self.store.get(id).await?.ok_or(UserError::NotFound)
    }
}
