//! Database connection management and the catalog repository.

pub mod capabilities;
pub mod queryables;
pub mod records;
pub mod repository;
pub mod setup;

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::util;

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};
#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres")]
pub type DbPool = PgPool;
#[cfg(feature = "sqlite")]
pub type DbPool = SqlitePool;

#[cfg(feature = "postgres")]
type DbPoolOptions = PgPoolOptions;
#[cfg(feature = "sqlite")]
type DbPoolOptions = SqlitePoolOptions;

pub use capabilities::{Capabilities, SpatialSupport};
pub use queryables::{MappingDocument, QueryableDef, Queryables};
pub use records::{COLUMNS, ColumnType, Record, describe};
pub use repository::{
    Constraint, DomainQueryType, DomainResult, PropertyUpdate, QueryResult, Repository, SortBy,
    SortOrder, SpatialFilter, SpatialRanking,
};
pub use setup::setup;

/// Registry of connection pools, keyed by connection target.
///
/// Pools are expensive to initialize, so the first repository bound to a
/// target creates the pool and every later one reuses it. The registry is
/// an explicit object owned by the application's startup sequence and
/// injected into each repository; entries live for the registry's
/// lifetime, there is no eviction. Detected backend capabilities are
/// memoized here per target as well.
pub struct PoolRegistry {
    inner: Mutex<RegistryInner>,
    max_connections: u32,
}

#[derive(Default)]
struct RegistryInner {
    pools: HashMap<String, DbPool>,
    capabilities: HashMap<String, Capabilities>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    /// Registry with the pool size taken from `DATABASE_MAX_CONNECTIONS`
    /// (default 10).
    pub fn new() -> Self {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        Self::with_max_connections(max_connections)
    }

    pub fn with_max_connections(max_connections: u32) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_connections,
        }
    }

    /// Pool for `url`, creating and caching it on first use.
    pub async fn get_or_connect(&self, url: &str) -> Result<DbPool, sqlx::Error> {
        let mut inner = self.inner.lock().await;
        if let Some(pool) = inner.pools.get(url) {
            debug!("reusing pool for {}", util::sanitize_db_connect(url));
            return Ok(pool.clone());
        }

        info!("creating new pool: {}", util::sanitize_db_connect(url));
        let pool = DbPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await?;
        inner.pools.insert(url.to_string(), pool.clone());
        Ok(pool)
    }

    /// Like [`get_or_connect`](Self::get_or_connect), but waits for a cold
    /// backend: retries every `retry_interval` up to `max_tries` times
    /// before giving up.
    pub async fn connect_with_retry(
        &self,
        url: &str,
        retry_interval: Duration,
        max_tries: u32,
    ) -> Result<DbPool, sqlx::Error> {
        let mut tries = 0;
        loop {
            match self.get_or_connect(url).await {
                Ok(pool) => return Ok(pool),
                Err(err) => {
                    tries += 1;
                    if tries >= max_tries {
                        return Err(err);
                    }
                    warn!(
                        "database not responding yet ({err}); retrying in {}s",
                        retry_interval.as_secs()
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    /// Capability descriptor for `url`, probing the backend on first call
    /// and returning the memoized result afterwards.
    pub async fn capabilities_for(&self, url: &str, pool: &DbPool, table: &str) -> Capabilities {
        {
            let inner = self.inner.lock().await;
            if let Some(capabilities) = inner.capabilities.get(url) {
                return capabilities.clone();
            }
        }

        let capabilities = capabilities::detect(pool, table).await;
        let mut inner = self.inner.lock().await;
        inner
            .capabilities
            .entry(url.to_string())
            .or_insert_with(|| capabilities.clone());
        capabilities
    }
}
