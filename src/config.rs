use anyhow::Context;
use serde::Deserialize;

/// Upper bound for `JWT_TTL_MINUTES`: one year.
pub const MAX_JWT_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

impl JwtConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(
            (1..=MAX_JWT_TTL_MINUTES).contains(&self.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_JWT_TTL_MINUTES}, got {}",
            self.ttl_minutes
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// When unset the service keeps users in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let ttl_minutes = match std::env::var("JWT_TTL_MINUTES") {
            Ok(v) => v
                .parse::<i64>()
                .with_context(|| format!("JWT_TTL_MINUTES is not a number: {v}"))?,
            Err(_) => 60,
        };
        let jwt = JwtConfig {
            secret: required_env("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "blog-users".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "blog-users-clients".into()),
            ttl_minutes,
        };
        jwt.validate()?;
        Ok(Self {
            database_url,
            database_max_connections,
            jwt,
        })
    }
}
