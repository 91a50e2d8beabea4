//! Arena coordinator - composition root for request handlers
//!
//! Orchestrates admission, combat, the snapshot cache, and the persistence
//! collaborator. Every mutating write is followed by cache invalidation
//! for the affected ids before the operation reports success; a cache miss
//! never means "does not exist" and always falls back to persistence.
//!
//! Two near-simultaneous combats on the same fighter can lose one update;
//! aliveness is re-validated immediately before resolving, and the rare
//! remaining lost-update is an accepted edge case rather than a reason for
//! per-fighter locking.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::admission::AdmissionController;
use crate::combat;
use crate::matchmaking::{rank_opponents, RankedOpponent};
use crate::notify::PromotionNotifier;
use crate::{ArenaError, ArenaResult};
use reefclash_store::{FighterStore, SnapshotCache, StoreConfig};
use reefclash_types::{
    ActiveMembership, ArenaStatus, BattleConfig, FighterId, FighterSnapshot, FighterUpdate,
    JoinOutcome, MatchOutcome, UserId, POSITION_ROWS,
};

/// Default matchmaking level window (±levels)
pub const DEFAULT_LEVEL_WINDOW: u32 = 3;

/// Snapshot-cache TTLs; a safety net behind invalidate-on-write.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub fighter: Duration,
    pub config: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            fighter: Duration::from_secs(60),
            config: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub fn from_store_config(config: &StoreConfig) -> Self {
        Self {
            fighter: config.fighter_cache_ttl(),
            config: config.config_cache_ttl(),
        }
    }
}

/// Composition root used by stateless request handlers.
pub struct ArenaCoordinator {
    fighters: Arc<dyn FighterStore>,
    cache: Arc<dyn SnapshotCache>,
    admission: AdmissionController,
    notifier: Arc<dyn PromotionNotifier>,
    ttls: CacheTtls,
}

impl ArenaCoordinator {
    pub fn new(
        fighters: Arc<dyn FighterStore>,
        cache: Arc<dyn SnapshotCache>,
        admission: AdmissionController,
        notifier: Arc<dyn PromotionNotifier>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            fighters,
            cache,
            admission,
            notifier,
            ttls,
        }
    }

    // =========================================================================
    // Read-through snapshots
    // =========================================================================

    /// Fighter snapshot, cache first, persistence on a miss.
    pub async fn fighter(&self, id: &FighterId) -> ArenaResult<FighterSnapshot> {
        if let Some(snapshot) = self.cache.get_fighter(id).await? {
            return Ok(snapshot);
        }
        let snapshot = self
            .fighters
            .read_fighter(id)
            .await?
            .ok_or_else(|| ArenaError::NotFound(format!("fighter {}", id)))?;
        self.cache.put_fighter(&snapshot, self.ttls.fighter).await?;
        Ok(snapshot)
    }

    /// Battle config, cache first, persistence on a miss.
    pub async fn config(&self) -> ArenaResult<BattleConfig> {
        if let Some(config) = self.cache.get_config().await? {
            return Ok(config);
        }
        let config = self
            .fighters
            .read_config()
            .await?
            .ok_or_else(|| ArenaError::NotFound("battle config".to_string()))?;
        self.cache.put_config(&config, self.ttls.config).await?;
        Ok(config)
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Admit the user's fighter or queue them. Never blocks server-side;
    /// waiting is client-driven via `status` polling and heartbeats.
    pub async fn join(&self, user_id: UserId, fighter_id: FighterId) -> ArenaResult<JoinOutcome> {
        let fighter = self.fighter(&fighter_id).await?;
        if fighter.owner_id != user_id {
            return Err(ArenaError::Validation(format!(
                "fighter {} does not belong to user {}",
                fighter_id, user_id
            )));
        }
        if !fighter.can_fight() {
            return Err(ArenaError::Validation(format!(
                "fighter {} is not able to fight",
                fighter_id
            )));
        }

        let config = self.config().await?;
        let result = self
            .admission
            .join(user_id, fighter_id, config.arena_capacity)
            .await?;
        self.notify_promotions(&result.promoted).await;
        Ok(result.outcome)
    }

    /// Leave the arena or cancel a queue slot; returns the active count
    /// after any promotions.
    pub async fn leave(&self, user_id: UserId) -> ArenaResult<u64> {
        let config = self.config().await?;
        let result = self.admission.leave(user_id, config.arena_capacity).await?;
        self.notify_promotions(&result.promoted).await;
        Ok(result.active_count)
    }

    /// Refresh the user's membership heartbeat.
    pub async fn heartbeat(&self, user_id: UserId, fighter_id: FighterId) -> ArenaResult<bool> {
        self.admission.heartbeat(user_id, fighter_id).await
    }

    /// Arena view for the user; runs the lazy eviction/promotion sweep.
    pub async fn status(&self, user_id: UserId) -> ArenaResult<ArenaStatus> {
        let config = self.config().await?;
        let result = self
            .admission
            .status(user_id, config.arena_capacity)
            .await?;
        self.notify_promotions(&result.promoted).await;
        Ok(result.status)
    }

    // =========================================================================
    // Combat
    // =========================================================================

    /// Resolve combat between two admitted fighters, persist the outcome,
    /// and evict a dead loser from the arena as part of the same logical
    /// operation.
    pub async fn resolve(
        &self,
        attacker_id: FighterId,
        defender_id: FighterId,
    ) -> ArenaResult<MatchOutcome> {
        if attacker_id == defender_id {
            return Err(ArenaError::Validation(
                "a fighter cannot battle itself".to_string(),
            ));
        }

        let config = self.config().await?;
        let attacker = self.fighter(&attacker_id).await?;
        let defender = self.fighter(&defender_id).await?;

        let resolved = combat::resolve(&attacker, &defender, &config, &mut rand::thread_rng())?;

        self.fighters
            .write_combat_outcome(
                &resolved.outcome.winner_id,
                &resolved.winner_update,
                &resolved.outcome.loser_id,
                &resolved.loser_update,
                &resolved.log,
            )
            .await?;

        // Invalidate before acknowledging: a reader after this call must
        // never see the pre-combat snapshots.
        self.cache
            .invalidate_fighter(&resolved.outcome.winner_id)
            .await?;
        self.cache
            .invalidate_fighter(&resolved.outcome.loser_id)
            .await?;

        info!(
            battle = %resolved.outcome.battle_id,
            winner = %resolved.outcome.winner_id,
            loser = %resolved.outcome.loser_id,
            loser_died = resolved.outcome.loser_died,
            "battle resolved"
        );

        if resolved.outcome.loser_died {
            let loser_owner = resolved.outcome.loser_owner;
            let result = self
                .admission
                .leave(loser_owner, config.arena_capacity)
                .await?;
            if result.was_active {
                info!(user = %loser_owner, "dead fighter's owner evicted from arena");
            }
            self.notify_promotions(&result.promoted).await;
        }

        Ok(resolved.outcome)
    }

    /// Ranked opponents for a fighter, closest canonical power first.
    pub async fn match_opponent(
        &self,
        fighter_id: FighterId,
        level_window: u32,
    ) -> ArenaResult<Vec<RankedOpponent>> {
        let seeker = self.fighter(&fighter_id).await?;
        if !seeker.can_fight() {
            return Err(ArenaError::Validation(format!(
                "fighter {} is not able to fight",
                fighter_id
            )));
        }
        let config = self.config().await?;

        let level_min = seeker.level.saturating_sub(level_window).max(1);
        let level_max = seeker.level.saturating_add(level_window);
        let candidates = self
            .fighters
            .list_opponents(level_min, level_max, &fighter_id)
            .await?;

        Ok(rank_opponents(&seeker, candidates, &config, level_window))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a partial-field update to a fighter and invalidate its cache
    /// entry.
    pub async fn update_fighter(
        &self,
        fighter_id: FighterId,
        update: FighterUpdate,
    ) -> ArenaResult<()> {
        if let Some(row) = update.position_row {
            if row >= POSITION_ROWS {
                return Err(ArenaError::Validation(format!(
                    "position row {} is out of range",
                    row
                )));
            }
        }
        self.fighters
            .write_fighter_fields(&fighter_id, &update)
            .await?;
        self.cache.invalidate_fighter(&fighter_id).await?;
        Ok(())
    }

    /// Register a new fighter record.
    pub async fn register_fighter(&self, fighter: FighterSnapshot) -> ArenaResult<()> {
        if fighter.talent > 100 {
            return Err(ArenaError::Validation(format!(
                "talent {} is out of range",
                fighter.talent
            )));
        }
        if fighter.position_row >= POSITION_ROWS {
            return Err(ArenaError::Validation(format!(
                "position row {} is out of range",
                fighter.position_row
            )));
        }
        self.fighters.create_fighter(&fighter).await?;
        self.cache.invalidate_fighter(&fighter.id).await?;
        Ok(())
    }

    /// Replace the battle config and invalidate the cached copy.
    pub async fn update_config(&self, config: BattleConfig) -> ArenaResult<()> {
        config.validate().map_err(ArenaError::Validation)?;
        self.fighters.write_config(&config).await?;
        self.cache.invalidate_config().await?;
        info!("battle config updated");
        Ok(())
    }

    async fn notify_promotions(&self, promoted: &[ActiveMembership]) {
        for membership in promoted {
            self.notifier.queue_promoted(membership).await;
        }
    }
}
