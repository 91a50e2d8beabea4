//! In-memory doubles for the store contracts (mock feature)
//!
//! Single-process stand-ins with the same observable semantics as the
//! Redis/PostgreSQL implementations, used by component tests. Each double
//! can be flipped unavailable to exercise the fail-closed paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::arena_state::ArenaStore;
use crate::cache::SnapshotCache;
use crate::repos::FighterStore;
use crate::{StoreError, StoreResult};
use reefclash_types::{
    ActiveMembership, BattleConfig, BattleLogRecord, FighterId, FighterSnapshot, FighterUpdate,
    QueueEntry, UserId,
};

fn unavailable() -> StoreError {
    StoreError::Unavailable("memory store marked unavailable".to_string())
}

// ============================================================================
// Arena State
// ============================================================================

#[derive(Default)]
struct ArenaState {
    members: HashMap<UserId, ActiveMembership>,
    queue: VecDeque<QueueEntry>,
}

/// In-memory arena coordination state.
#[derive(Default)]
pub struct MemoryArenaStore {
    state: Mutex<ArenaState>,
    down: AtomicBool,
}

impl MemoryArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a shared-store outage.
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl ArenaStore for MemoryArenaStore {
    async fn put_member(&self, membership: &ActiveMembership) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.lock();
        state
            .members
            .insert(membership.user_id, membership.clone());
        Ok(state.members.len() as u64)
    }

    async fn get_member(&self, user_id: &UserId) -> StoreResult<Option<ActiveMembership>> {
        self.check()?;
        Ok(self.state.lock().members.get(user_id).cloned())
    }

    async fn remove_member(&self, user_id: &UserId) -> StoreResult<bool> {
        self.check()?;
        Ok(self.state.lock().members.remove(user_id).is_some())
    }

    async fn member_count(&self) -> StoreResult<u64> {
        self.check()?;
        Ok(self.state.lock().members.len() as u64)
    }

    async fn list_members(&self) -> StoreResult<Vec<ActiveMembership>> {
        self.check()?;
        Ok(self.state.lock().members.values().cloned().collect())
    }

    async fn touch_member(&self, user_id: &UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        self.check()?;
        let mut state = self.state.lock();
        match state.members.get_mut(user_id) {
            Some(membership) => {
                membership.last_heartbeat = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queue_push_back(&self, entry: &QueueEntry) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.lock();
        state.queue.push_back(entry.clone());
        Ok(state.queue.len() as u64)
    }

    async fn queue_push_front(&self, entry: &QueueEntry) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.lock();
        state.queue.push_front(entry.clone());
        Ok(state.queue.len() as u64)
    }

    async fn queue_pop_front(&self) -> StoreResult<Option<QueueEntry>> {
        self.check()?;
        Ok(self.state.lock().queue.pop_front())
    }

    async fn queue_remove(&self, user_id: &UserId) -> StoreResult<bool> {
        self.check()?;
        let mut state = self.state.lock();
        let before = state.queue.len();
        state.queue.retain(|e| e.user_id != *user_id);
        Ok(state.queue.len() < before)
    }

    async fn queue_position(&self, user_id: &UserId) -> StoreResult<Option<u64>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .queue
            .iter()
            .position(|e| e.user_id == *user_id)
            .map(|i| i as u64 + 1))
    }

    async fn queue_len(&self) -> StoreResult<u64> {
        self.check()?;
        Ok(self.state.lock().queue.len() as u64)
    }

    async fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>> {
        self.check()?;
        Ok(self.state.lock().queue.iter().cloned().collect())
    }
}

// ============================================================================
// Snapshot Cache
// ============================================================================

struct CacheSlot<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> CacheSlot<T> {
    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

/// In-memory snapshot cache honoring TTLs.
#[derive(Default)]
pub struct MemorySnapshotCache {
    fighters: Mutex<HashMap<FighterId, CacheSlot<FighterSnapshot>>>,
    config: Mutex<Option<CacheSlot<BattleConfig>>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>> {
        Ok(self.fighters.lock().get(id).and_then(CacheSlot::live))
    }

    async fn put_fighter(&self, snapshot: &FighterSnapshot, ttl: Duration) -> StoreResult<()> {
        self.fighters.lock().insert(
            snapshot.id,
            CacheSlot {
                value: snapshot.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_fighter(&self, id: &FighterId) -> StoreResult<()> {
        self.fighters.lock().remove(id);
        Ok(())
    }

    async fn get_config(&self) -> StoreResult<Option<BattleConfig>> {
        Ok(self.config.lock().as_ref().and_then(CacheSlot::live))
    }

    async fn put_config(&self, config: &BattleConfig, ttl: Duration) -> StoreResult<()> {
        *self.config.lock() = Some(CacheSlot {
            value: config.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(())
    }

    async fn invalidate_config(&self) -> StoreResult<()> {
        *self.config.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Fighter Persistence
// ============================================================================

/// In-memory persistence collaborator. Written battle-log entries are kept
/// for test assertions.
#[derive(Default)]
pub struct MemoryFighterStore {
    fighters: Mutex<HashMap<FighterId, FighterSnapshot>>,
    config: Mutex<Option<BattleConfig>>,
    log: Mutex<Vec<BattleLogRecord>>,
    down: AtomicBool,
}

impl MemoryFighterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a config record.
    pub fn with_config(config: BattleConfig) -> Self {
        let store = Self::default();
        *store.config.lock() = Some(config);
        store
    }

    /// Simulate a persistence outage.
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Battle-log entries written so far.
    pub fn log_entries(&self) -> Vec<BattleLogRecord> {
        self.log.lock().clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl FighterStore for MemoryFighterStore {
    async fn read_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>> {
        self.check()?;
        Ok(self.fighters.lock().get(id).cloned())
    }

    async fn read_config(&self) -> StoreResult<Option<BattleConfig>> {
        self.check()?;
        Ok(self.config.lock().clone())
    }

    async fn write_fighter_fields(
        &self,
        id: &FighterId,
        update: &FighterUpdate,
    ) -> StoreResult<()> {
        self.check()?;
        let mut fighters = self.fighters.lock();
        let fighter = fighters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("fighter {}", id)))?;
        update.apply(fighter);
        Ok(())
    }

    async fn write_combat_outcome(
        &self,
        winner_id: &FighterId,
        winner: &FighterUpdate,
        loser_id: &FighterId,
        loser: &FighterUpdate,
        log: &BattleLogRecord,
    ) -> StoreResult<()> {
        self.check()?;
        let mut fighters = self.fighters.lock();
        // All-or-nothing: verify both rows exist before touching either.
        if !fighters.contains_key(winner_id) {
            return Err(StoreError::NotFound(format!("fighter {}", winner_id)));
        }
        if !fighters.contains_key(loser_id) {
            return Err(StoreError::NotFound(format!("fighter {}", loser_id)));
        }
        winner.apply(fighters.get_mut(winner_id).unwrap());
        loser.apply(fighters.get_mut(loser_id).unwrap());
        self.log.lock().push(log.clone());
        Ok(())
    }

    async fn list_opponents(
        &self,
        level_min: u32,
        level_max: u32,
        exclude: &FighterId,
    ) -> StoreResult<Vec<FighterSnapshot>> {
        self.check()?;
        let mut candidates: Vec<FighterSnapshot> = self
            .fighters
            .lock()
            .values()
            .filter(|f| {
                f.is_alive && f.id != *exclude && (level_min..=level_max).contains(&f.level)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|f| (f.level, *f.id.as_uuid()));
        Ok(candidates)
    }

    async fn write_config(&self, config: &BattleConfig) -> StoreResult<()> {
        self.check()?;
        *self.config.lock() = Some(config.clone());
        Ok(())
    }

    async fn create_fighter(&self, fighter: &FighterSnapshot) -> StoreResult<()> {
        self.check()?;
        self.fighters.lock().insert(fighter.id, fighter.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reefclash_types::UserId;

    fn member(user_id: UserId) -> ActiveMembership {
        ActiveMembership::admitted_at(user_id, FighterId::new(), Utc::now())
    }

    #[tokio::test]
    async fn test_membership_upsert_keeps_count() {
        let store = MemoryArenaStore::new();
        let user = UserId::new();

        assert_eq!(store.put_member(&member(user)).await.unwrap(), 1);
        assert_eq!(store.put_member(&member(user)).await.unwrap(), 1);
        assert_eq!(store.put_member(&member(UserId::new())).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_queue_fifo_and_head_push() {
        let store = MemoryArenaStore::new();
        let first = UserId::new();
        let second = UserId::new();
        let jumped = UserId::new();
        let now = Utc::now();

        let entry = |user_id| QueueEntry {
            user_id,
            fighter_id: FighterId::new(),
            enqueued_at: now,
        };

        store.queue_push_back(&entry(first)).await.unwrap();
        store.queue_push_back(&entry(second)).await.unwrap();
        store.queue_push_front(&entry(jumped)).await.unwrap();

        assert_eq!(store.queue_position(&second).await.unwrap(), Some(3));
        assert_eq!(
            store.queue_pop_front().await.unwrap().unwrap().user_id,
            jumped
        );
        assert_eq!(
            store.queue_pop_front().await.unwrap().unwrap().user_id,
            first
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_closed() {
        let store = MemoryArenaStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.member_count().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let cache = MemorySnapshotCache::new();
        let config = BattleConfig::default();

        cache
            .put_config(&config, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(cache.get_config().await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get_config().await.unwrap().is_none());
    }
}
