//! Snapshot cache - read-through, write-invalidate
//!
//! A miss never means "does not exist": callers fall back to persistence
//! and repopulate on success. TTL is a safety net; invalidate-on-write is
//! the primary consistency mechanism.

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool as RedisPool};
use std::time::Duration;
use tracing::warn;

use crate::{StoreError, StoreResult};
use reefclash_types::{BattleConfig, FighterId, FighterSnapshot};

/// Cache key prefixes for organization
pub mod keys {
    pub const FIGHTER: &str = "cache:fighter:";
    pub const CONFIG: &str = "cache:config";
}

/// Cache port for fighter snapshots and the battle-config singleton.
///
/// Reads and population are best-effort; invalidation is not. A write path
/// must never acknowledge success while a stale entry could still be served,
/// so `invalidate_*` failures propagate to the caller.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>>;
    async fn put_fighter(&self, snapshot: &FighterSnapshot, ttl: Duration) -> StoreResult<()>;
    async fn invalidate_fighter(&self, id: &FighterId) -> StoreResult<()>;

    async fn get_config(&self) -> StoreResult<Option<BattleConfig>>;
    async fn put_config(&self, config: &BattleConfig, ttl: Duration) -> StoreResult<()>;
    async fn invalidate_config(&self) -> StoreResult<()>;
}

/// Redis-backed snapshot cache shared by all handlers.
pub struct RedisSnapshotCache {
    pool: RedisPool,
}

impl RedisSnapshotCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn fighter_key(id: &FighterId) -> String {
        format!("{}{}", keys::FIGHTER, id.as_uuid())
    }

    /// Fetch and decode a cached JSON value. An entry that no longer
    /// decodes is deleted and reported as a miss, never served.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("cache read degraded to miss: {}", e);
                return Ok(None);
            }
        };

        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cache read degraded to miss: {}", e);
                return Ok(None);
            }
        };

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("dropping undecodable cache entry {}: {}", key, e);
                    let _: Result<i32, _> = conn.del(key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Population is best-effort; a failed put leaves the entry absent.
    async fn put_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("cache put skipped: {}", e);
                return Ok(());
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1))
            .await
        {
            warn!("cache put skipped: {}", e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i32 = conn
            .del(key)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>> {
        self.get_json(&Self::fighter_key(id)).await
    }

    async fn put_fighter(&self, snapshot: &FighterSnapshot, ttl: Duration) -> StoreResult<()> {
        self.put_json(&Self::fighter_key(&snapshot.id), snapshot, ttl)
            .await
    }

    async fn invalidate_fighter(&self, id: &FighterId) -> StoreResult<()> {
        self.delete(&Self::fighter_key(id)).await
    }

    async fn get_config(&self) -> StoreResult<Option<BattleConfig>> {
        self.get_json(keys::CONFIG).await
    }

    async fn put_config(&self, config: &BattleConfig, ttl: Duration) -> StoreResult<()> {
        self.put_json(keys::CONFIG, config, ttl).await
    }

    async fn invalidate_config(&self) -> StoreResult<()> {
        self.delete(keys::CONFIG).await
    }
}
