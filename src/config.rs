use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout: Duration,
    pub jwt_signing_key: String,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub admin: Option<AdminSeed>,
}

/// Account ensured to exist with the admin role at startup.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed").field("username", &self.username).finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://filmoteka.db?mode=rwc".to_string());

        let db_max_connections: u32 =
            std::env::var("DB_MAX_CONNECTIONS").ok().and_then(|s| s.parse().ok()).unwrap_or(5);

        let db_timeout_secs: u64 =
            std::env::var("DB_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(5);

        let jwt_signing_key = std::env::var("JWT_SIGNING_KEY").context("JWT_SIGNING_KEY")?;
        if jwt_signing_key.trim().is_empty() {
            anyhow::bail!("JWT_SIGNING_KEY must not be empty");
        }

        let token_ttl_hours: u64 =
            std::env::var("TOKEN_TTL_HOURS").ok().and_then(|s| s.parse().ok()).unwrap_or(12);

        let bcrypt_cost: u32 =
            std::env::var("BCRYPT_COST").ok().and_then(|s| s.parse().ok()).unwrap_or(10);

        let admin = match (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) if !username.trim().is_empty() => {
                Some(AdminSeed { username, password })
            },
            _ => None,
        };

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            db_max_connections,
            db_timeout: Duration::from_secs(db_timeout_secs.max(1)),
            jwt_signing_key,
            token_ttl: Duration::from_secs(token_ttl_hours.max(1) * 3600),
            bcrypt_cost,
            admin,
        })
    }
}
