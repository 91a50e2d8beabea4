//! Arena coordination state - membership set and FIFO waiting queue
//!
//! Stateless handlers coordinate admission exclusively through these
//! atomic primitives; there is no distributed lock service. The membership
//! record set and the queue list are the only shared mutable state, and
//! any backend failure surfaces as `StoreError::Unavailable` so admission
//! decisions fail closed rather than guessing at capacity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{redis::AsyncCommands, Pool as RedisPool};

use crate::StoreResult;
use reefclash_types::{ActiveMembership, QueueEntry, UserId};

/// Redis key for the active-membership hash (field: user UUID)
const ACTIVE_KEY: &str = "arena:active";
/// Redis key for the FIFO waiting queue (list of JSON entries)
const QUEUE_KEY: &str = "arena:queue";

/// Atomic shared-state primitives backing the admission controller.
#[async_trait]
pub trait ArenaStore: Send + Sync {
    /// Insert or refresh a membership; returns the member count after the
    /// insert so optimistic admission can re-check cardinality.
    async fn put_member(&self, membership: &ActiveMembership) -> StoreResult<u64>;
    async fn get_member(&self, user_id: &UserId) -> StoreResult<Option<ActiveMembership>>;
    /// Returns true when a membership existed and was removed.
    async fn remove_member(&self, user_id: &UserId) -> StoreResult<bool>;
    async fn member_count(&self) -> StoreResult<u64>;
    async fn list_members(&self) -> StoreResult<Vec<ActiveMembership>>;
    /// Refresh a membership heartbeat; a no-op returning false when the
    /// user holds no membership.
    async fn touch_member(&self, user_id: &UserId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Append to the queue tail; returns the queue length after the push.
    async fn queue_push_back(&self, entry: &QueueEntry) -> StoreResult<u64>;
    /// Push to the queue head (capacity-race compensation path).
    async fn queue_push_front(&self, entry: &QueueEntry) -> StoreResult<u64>;
    async fn queue_pop_front(&self) -> StoreResult<Option<QueueEntry>>;
    /// Remove every queue entry for the user; returns true if any existed.
    async fn queue_remove(&self, user_id: &UserId) -> StoreResult<bool>;
    /// 1-based position of the user's first queue entry.
    async fn queue_position(&self, user_id: &UserId) -> StoreResult<Option<u64>>;
    async fn queue_len(&self) -> StoreResult<u64>;
    async fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>>;
}

/// Redis-backed arena state shared across handler processes.
pub struct RedisArenaStore {
    pool: RedisPool,
}

impl RedisArenaStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArenaStore for RedisArenaStore {
    async fn put_member(&self, membership: &ActiveMembership) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(membership)?;
        let _: i32 = conn
            .hset(ACTIVE_KEY, membership.user_id.as_uuid().to_string(), json)
            .await?;
        let count: u64 = conn.hlen(ACTIVE_KEY).await?;
        Ok(count)
    }

    async fn get_member(&self, user_id: &UserId) -> StoreResult<Option<ActiveMembership>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.hget(ACTIVE_KEY, user_id.as_uuid().to_string()).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove_member(&self, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i32 = conn.hdel(ACTIVE_KEY, user_id.as_uuid().to_string()).await?;
        Ok(removed > 0)
    }

    async fn member_count(&self) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let count: u64 = conn.hlen(ACTIVE_KEY).await?;
        Ok(count)
    }

    async fn list_members(&self) -> StoreResult<Vec<ActiveMembership>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.hvals(ACTIVE_KEY).await?;
        let mut members = Vec::with_capacity(raw.len());
        for json in raw {
            members.push(serde_json::from_str(&json)?);
        }
        Ok(members)
    }

    async fn touch_member(&self, user_id: &UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        // Read-modify-write; a lost heartbeat refresh only shortens the
        // liveness extension, it never admits anyone.
        let Some(mut membership) = self.get_member(user_id).await? else {
            return Ok(false);
        };
        membership.last_heartbeat = at;
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(&membership)?;
        let _: i32 = conn
            .hset(ACTIVE_KEY, user_id.as_uuid().to_string(), json)
            .await?;
        Ok(true)
    }

    async fn queue_push_back(&self, entry: &QueueEntry) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(entry)?;
        let len: u64 = conn.rpush(QUEUE_KEY, json).await?;
        Ok(len)
    }

    async fn queue_push_front(&self, entry: &QueueEntry) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(entry)?;
        let len: u64 = conn.lpush(QUEUE_KEY, json).await?;
        Ok(len)
    }

    async fn queue_pop_front(&self) -> StoreResult<Option<QueueEntry>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.lpop(QUEUE_KEY, None).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn queue_remove(&self, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.lrange(QUEUE_KEY, 0, -1).await?;
        let mut removed = false;
        for json in raw {
            let entry: QueueEntry = match serde_json::from_str(&json) {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if entry.user_id == *user_id {
                let count: i32 = conn.lrem(QUEUE_KEY, 0, json).await?;
                removed |= count > 0;
            }
        }
        Ok(removed)
    }

    async fn queue_position(&self, user_id: &UserId) -> StoreResult<Option<u64>> {
        let entries = self.queue_entries().await?;
        Ok(entries
            .iter()
            .position(|e| e.user_id == *user_id)
            .map(|i| i as u64 + 1))
    }

    async fn queue_len(&self) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let len: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }

    async fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.lrange(QUEUE_KEY, 0, -1).await?;
        let mut entries = Vec::with_capacity(raw.len());
        for json in raw {
            entries.push(serde_json::from_str(&json)?);
        }
        Ok(entries)
    }
}
