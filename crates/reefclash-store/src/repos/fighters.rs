//! Fighter persistence repository
//!
//! The durable owner of fighter records, the battle-config singleton, and
//! the battle log. Combat persistence writes both fighters and the log
//! entry in one transaction; win/loss counters are applied as atomic
//! increments.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::models::{DbBattleConfig, DbFighter};
use crate::StoreResult;
use reefclash_types::{
    BattleConfig, BattleLogRecord, FighterId, FighterSnapshot, FighterUpdate,
};

/// Read/write contract for the persistence collaborator.
#[async_trait]
pub trait FighterStore: Send + Sync {
    async fn read_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>>;
    async fn read_config(&self) -> StoreResult<Option<BattleConfig>>;

    /// Apply a partial-field update to a single fighter.
    async fn write_fighter_fields(&self, id: &FighterId, update: &FighterUpdate)
        -> StoreResult<()>;

    /// Persist a combat outcome: both fighters plus the log entry as one
    /// logical transaction.
    async fn write_combat_outcome(
        &self,
        winner_id: &FighterId,
        winner: &FighterUpdate,
        loser_id: &FighterId,
        loser: &FighterUpdate,
        log: &BattleLogRecord,
    ) -> StoreResult<()>;

    /// Alive fighters inside the level window, excluding the seeker.
    async fn list_opponents(
        &self,
        level_min: u32,
        level_max: u32,
        exclude: &FighterId,
    ) -> StoreResult<Vec<FighterSnapshot>>;

    async fn write_config(&self, config: &BattleConfig) -> StoreResult<()>;

    async fn create_fighter(&self, fighter: &FighterSnapshot) -> StoreResult<()>;
}

pub struct PgFighterStore {
    pool: PgPool,
}

impl PgFighterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_update(
        conn: &mut PgConnection,
        id: &FighterId,
        update: &FighterUpdate,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE fighters SET
                level = COALESCE($2, level),
                health = COALESCE($3, health),
                max_health = COALESCE($4, max_health),
                experience = COALESCE($5, experience),
                is_alive = COALESCE($6, is_alive),
                battle_power = COALESCE($7, battle_power),
                position_row = COALESCE($8, position_row),
                total_wins = total_wins + COALESCE($9, 0),
                total_losses = total_losses + COALESCE($10, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.level.map(|v| v as i32))
        .bind(update.health)
        .bind(update.max_health)
        .bind(update.experience.map(|v| v as i64))
        .bind(update.is_alive)
        .bind(update.battle_power)
        .bind(update.position_row.map(|v| v as i16))
        .bind(update.wins_delta.map(|v| v as i64))
        .bind(update.losses_delta.map(|v| v as i64))
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FighterStore for PgFighterStore {
    async fn read_fighter(&self, id: &FighterId) -> StoreResult<Option<FighterSnapshot>> {
        let row = sqlx::query_as::<_, DbFighter>("SELECT * FROM fighters WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FighterSnapshot::from))
    }

    async fn read_config(&self) -> StoreResult<Option<BattleConfig>> {
        let row =
            sqlx::query_as::<_, DbBattleConfig>("SELECT * FROM battle_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(BattleConfig::from))
    }

    async fn write_fighter_fields(
        &self,
        id: &FighterId,
        update: &FighterUpdate,
    ) -> StoreResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.acquire().await?;
        Self::apply_update(&mut conn, id, update).await?;
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
        let mut tx = self.pool.begin().await?;

        Self::apply_update(&mut tx, winner_id, winner).await?;
        Self::apply_update(&mut tx, loser_id, loser).await?;

        sqlx::query(
            r#"
            INSERT INTO battle_log (id, winner_id, loser_id, winner_power, loser_power,
                winner_final_power, loser_final_power, exp_awarded, health_lost,
                level_up, loser_died, fought_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(log.battle_id.as_uuid())
        .bind(log.winner_id.as_uuid())
        .bind(log.loser_id.as_uuid())
        .bind(log.winner_power)
        .bind(log.loser_power)
        .bind(log.winner_final_power)
        .bind(log.loser_final_power)
        .bind(log.exp_awarded as i64)
        .bind(log.health_lost)
        .bind(log.level_up)
        .bind(log.loser_died)
        .bind(log.fought_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_opponents(
        &self,
        level_min: u32,
        level_max: u32,
        exclude: &FighterId,
    ) -> StoreResult<Vec<FighterSnapshot>> {
        let rows = sqlx::query_as::<_, DbFighter>(
            r#"
            SELECT * FROM fighters
            WHERE is_alive AND level BETWEEN $1 AND $2 AND id <> $3
            ORDER BY level, id
            "#,
        )
        .bind(level_min as i32)
        .bind(level_max as i32)
        .bind(exclude.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FighterSnapshot::from).collect())
    }

    async fn write_config(&self, config: &BattleConfig) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO battle_config (id, level_weight, talent_weight, vote_weight,
                random_factor, exp_per_win, health_loss_per_defeat, max_health_per_level,
                exp_base, exp_multiplier, arena_capacity, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE SET
                level_weight = EXCLUDED.level_weight,
                talent_weight = EXCLUDED.talent_weight,
                vote_weight = EXCLUDED.vote_weight,
                random_factor = EXCLUDED.random_factor,
                exp_per_win = EXCLUDED.exp_per_win,
                health_loss_per_defeat = EXCLUDED.health_loss_per_defeat,
                max_health_per_level = EXCLUDED.max_health_per_level,
                exp_base = EXCLUDED.exp_base,
                exp_multiplier = EXCLUDED.exp_multiplier,
                arena_capacity = EXCLUDED.arena_capacity,
                updated_at = NOW()
            "#,
        )
        .bind(config.level_weight)
        .bind(config.talent_weight)
        .bind(config.vote_weight)
        .bind(config.random_factor)
        .bind(config.exp_per_win as i64)
        .bind(config.health_loss_per_defeat)
        .bind(config.max_health_per_level)
        .bind(config.exp_base)
        .bind(config.exp_multiplier)
        .bind(config.arena_capacity as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_fighter(&self, fighter: &FighterSnapshot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fighters (id, owner_id, level, talent, positive_votes, health,
                max_health, experience, is_alive, total_wins, total_losses,
                battle_power, position_row, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
            "#,
        )
        .bind(fighter.id.as_uuid())
        .bind(fighter.owner_id.as_uuid())
        .bind(fighter.level as i32)
        .bind(fighter.talent as i32)
        .bind(fighter.positive_votes as i32)
        .bind(fighter.health)
        .bind(fighter.max_health)
        .bind(fighter.experience as i64)
        .bind(fighter.is_alive)
        .bind(fighter.total_wins as i64)
        .bind(fighter.total_losses as i64)
        .bind(fighter.battle_power)
        .bind(fighter.position_row as i16)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
