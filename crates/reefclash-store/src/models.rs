//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use reefclash_types::{BattleConfig, FighterId, FighterSnapshot, UserId};

// ============================================================================
// Fighter Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbFighter {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub level: i32,
    pub talent: i32,
    pub positive_votes: i32,
    pub health: i64,
    pub max_health: i64,
    pub experience: i64,
    pub is_alive: bool,
    pub total_wins: i64,
    pub total_losses: i64,
    pub battle_power: f64,
    pub position_row: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbFighter> for FighterSnapshot {
    fn from(row: DbFighter) -> Self {
        Self {
            id: FighterId::from_uuid(row.id),
            owner_id: UserId::from_uuid(row.owner_id),
            level: row.level.max(1) as u32,
            talent: row.talent.max(0) as u32,
            positive_votes: row.positive_votes.max(0) as u32,
            health: row.health,
            max_health: row.max_health,
            experience: row.experience.max(0) as u64,
            is_alive: row.is_alive,
            total_wins: row.total_wins.max(0) as u64,
            total_losses: row.total_losses.max(0) as u64,
            battle_power: row.battle_power,
            position_row: row.position_row.clamp(0, 9) as u8,
        }
    }
}

// ============================================================================
// Battle Config Model
// ============================================================================

/// Singleton balance record, keyed by a fixed id of 1.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbBattleConfig {
    pub id: i16,
    pub level_weight: f64,
    pub talent_weight: f64,
    pub vote_weight: f64,
    pub random_factor: f64,
    pub exp_per_win: i64,
    pub health_loss_per_defeat: i64,
    pub max_health_per_level: i64,
    pub exp_base: f64,
    pub exp_multiplier: f64,
    pub arena_capacity: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBattleConfig> for BattleConfig {
    fn from(row: DbBattleConfig) -> Self {
        Self {
            level_weight: row.level_weight,
            talent_weight: row.talent_weight,
            vote_weight: row.vote_weight,
            random_factor: row.random_factor,
            exp_per_win: row.exp_per_win.max(0) as u64,
            health_loss_per_defeat: row.health_loss_per_defeat,
            max_health_per_level: row.max_health_per_level,
            exp_base: row.exp_base,
            exp_multiplier: row.exp_multiplier,
            arena_capacity: row.arena_capacity.max(0) as u64,
        }
    }
}
