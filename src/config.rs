use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Which password hashing scheme new hashes are produced with.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    Bcrypt,
    Argon2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub hasher: HasherKind,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

pub const DEFAULT_BCRYPT_COST: u32 = 10;
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;
/// One year.
pub const MAX_JWT_TTL_MINUTES: i64 = 60 * 24 * 365;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("USER_STORE").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => anyhow::bail!("unknown USER_STORE {other:?}"),
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when USER_STORE=postgres");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userauth-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };
        anyhow::ensure!(
            (1..=MAX_JWT_TTL_MINUTES).contains(&jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be within 1..={MAX_JWT_TTL_MINUTES}"
        );

        let hasher = match std::env::var("PASSWORD_HASHER").as_deref() {
            Ok("argon2") => HasherKind::Argon2,
            Ok("bcrypt") | Err(_) => HasherKind::Bcrypt,
            Ok(other) => anyhow::bail!("unknown PASSWORD_HASHER {other:?}"),
        };
        let bcrypt_cost = std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_BCRYPT_COST);
        anyhow::ensure!(
            BCRYPT_COST_RANGE.contains(&bcrypt_cost),
            "BCRYPT_COST must be within {BCRYPT_COST_RANGE:?}"
        );

        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        Ok(Self {
            store,
            database_url,
            db_max_connections,
            jwt,
            password: PasswordConfig {
                hasher,
                bcrypt_cost,
            },
        })
    }
}
