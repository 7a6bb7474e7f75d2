use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};

use crate::{
    auth::{jwt::JwtKeys, password},
    config::{AppConfig, StoreBackend},
    db,
    users::{
        memory::MemoryUserStore,
        repo::{PgUserStore, UserStore},
        service::UserService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn UserStore> = match config.store {
            StoreBackend::Postgres => {
                let pool = db::connect(&config).await?;
                if let Err(e) = db::migrate(&pool).await {
                    warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(pool))
            }
            StoreBackend::Memory => {
                warn!("using in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };
        info!(store = ?config.store, hasher = ?config.password.hasher, "user store ready");

        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        let hasher = Arc::from(password::from_config(&config.password));
        let tokens = Arc::new(JwtKeys::from_config(&config.jwt));
        let users = UserService::new(store, hasher, tokens);
        Self { config, users }
    }

    /// In-memory wiring for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{HasherKind, JwtConfig, PasswordConfig};

        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                hasher: HasherKind::Bcrypt,
                bcrypt_cost: 4,
            },
        });
        Self::from_parts(config, Arc::new(MemoryUserStore::new()))
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}
