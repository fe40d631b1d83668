use moka::future::Cache;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::entity::types;
use crate::streaming::registry::SubscriptionRegistry;

/// Cache for type-name lookups. The query compiler and the streaming
/// manager resolve every referenced type name; the registry of types is
/// small and changes rarely, so entries live for the configured TTL.
pub type TypeCache = Cache<String, Arc<types::Model>>;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Connection pool to the streaming sidecar; `None` disables subscriptions.
    pub streaming_db: Option<DatabaseConnection>,
    pub config: Arc<Config>,
    pub type_cache: TypeCache,
    pub registry: Arc<SubscriptionRegistry>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        streaming_db: Option<DatabaseConnection>,
        config: Config,
    ) -> Self {
        let type_cache: TypeCache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(config.type_cache_ttl_seconds))
            .build();

        Self {
            db,
            streaming_db,
            config: Arc::new(config),
            type_cache,
            registry: Arc::new(SubscriptionRegistry::new()),
        }
    }
}
