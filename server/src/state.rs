use std::sync::Arc;

use color_eyre::eyre::Context;
use db::cooking::{MemoryStore, PgStore, Store};
use tracing::instrument;

use crate::auth::{AllowAll, Authorizer, BearerToken};

const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub api_token: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppConfig {
    #[instrument(name = "AppConfig::from_env", err)]
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .wrap_err_with(|| format!("Invalid PORT {port:?}, expected a port number"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            api_token: var("API_TOKEN"),
        })
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<dyn Store>,
    pub authorizer: Arc<dyn Authorizer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[instrument(name = "AppState::from_config", skip(config), err)]
    pub async fn from_config(config: AppConfig) -> crate::Result<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(database_url) => {
                let pool = db::setup_db_pool(database_url).await?;
                tracing::info!("Using the Postgres store");
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL is not set, data will only live in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let authorizer: Arc<dyn Authorizer> = match &config.api_token {
            Some(token) => Arc::new(BearerToken::new(token.clone())),
            None => {
                tracing::warn!("API_TOKEN is not set, every write is allowed");
                Arc::new(AllowAll)
            }
        };

        Ok(Self::new(store, authorizer, config))
    }

    pub fn new(store: Arc<dyn Store>, authorizer: Arc<dyn Authorizer>, config: AppConfig) -> Self {
        Self {
            store,
            authorizer,
            config: Arc::new(config),
        }
    }
}
