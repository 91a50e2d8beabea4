//! Reefclash Shared-State Layer
//!
//! Persistence and coordination for the reefclash arena using PostgreSQL
//! and Redis.
//!
//! # Architecture
//!
//! - **PostgreSQL**: durable store for fighter records, the battle-config
//!   singleton, and the battle log
//! - **Redis**: cross-handler coordination state (active membership hash,
//!   FIFO waiting queue) and the snapshot cache
//!
//! Request handlers are stateless and share no in-process memory; every
//! admission decision goes through atomic operations on Redis, and every
//! durable write is followed by cache invalidation for the affected ids.

pub mod arena_state;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod repos;

#[cfg(feature = "mock")]
pub mod memory;

use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, Runtime};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use arena_state::{ArenaStore, RedisArenaStore};
pub use cache::{RedisSnapshotCache, SnapshotCache};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use models::*;
pub use repos::{FighterStore, PgFighterStore};

#[cfg(feature = "mock")]
pub use memory::{MemoryArenaStore, MemoryFighterStore, MemorySnapshotCache};

/// Explicitly constructed handle owning both connection pools.
///
/// Built once at startup and injected into the components that need it;
/// there is no lazily-initialized global client.
pub struct Store {
    /// PostgreSQL connection pool
    pub pg: PgPool,
    /// Redis connection pool
    pub redis: RedisPool,
    config: StoreConfig,
}

impl Store {
    /// Connect to PostgreSQL and Redis, verifying both are reachable.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| StoreError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");

        info!("Connecting to Redis: {}", config.redis_url_masked());

        let redis_cfg = RedisConfig::from_url(&config.redis_url);
        let redis = redis_cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(format!("Redis: {}", e)))?;

        let mut conn = redis
            .get()
            .await
            .map_err(|e| StoreError::Connection(format!("Redis pool: {}", e)))?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Connection(format!("Redis ping: {}", e)))?;

        info!("Connected to Redis");

        Ok(Self { pg, redis, config })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check for both backends
    pub async fn health_check(&self) -> StoreHealth {
        let postgres = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();

        let redis = async {
            let mut conn = self.redis.get().await.ok()?;
            let result: Result<String, _> = deadpool_redis::redis::cmd("PING")
                .query_async(&mut *conn)
                .await;
            result.ok()
        }
        .await
        .is_some();

        StoreHealth {
            postgres,
            redis,
            healthy: postgres && redis,
        }
    }

    /// Close the PostgreSQL pool; Redis connections drop with the pool.
    pub async fn close(&self) {
        info!("Closing store connections");
        self.pg.close().await;
    }

    /// Fighter persistence repository
    pub fn fighters(&self) -> PgFighterStore {
        PgFighterStore::new(self.pg.clone())
    }

    /// Snapshot cache over Redis
    pub fn snapshot_cache(&self) -> RedisSnapshotCache {
        RedisSnapshotCache::new(self.redis.clone())
    }

    /// Arena coordination state over Redis
    pub fn arena_state(&self) -> RedisArenaStore {
        RedisArenaStore::new(self.redis.clone())
    }

    /// The configuration this store was built with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Health status of the shared-state backends
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreHealth {
    pub postgres: bool,
    pub redis: bool,
    pub healthy: bool,
}
