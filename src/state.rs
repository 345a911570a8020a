use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    auth::password::Argon2Hasher,
    config::AppConfig,
    users::{memory::InMemoryUserStore, repo::PgUserStore, repo::UserStore, services::UserService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                tracing::info!("using postgres user store");
                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory only");
                Arc::new(InMemoryUserStore::new())
            }
        };

        Ok(Self::from_parts(
            Arc::new(config),
            UserService::new(store, Arc::new(Argon2Hasher::default())),
        ))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: UserService) -> Self {
        Self { config, users }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::{auth::password::test_hasher, config::JwtConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            database_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
        });
        let users = UserService::new(Arc::new(InMemoryUserStore::new()), Arc::new(test_hasher()));
        Self::from_parts(config, users)
    }
}
