//! Battle configuration and combat outcome records

use crate::{BattleId, FighterId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Combat balance parameters.
///
/// A singleton record owned by the persistence layer so operators can tune
/// balance without a redeploy. Cached with a TTL plus explicit invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Weight applied to the fighter level
    pub level_weight: f64,
    /// Weight applied to talent (0-100)
    pub talent_weight: f64,
    /// Weight applied to positive votes
    pub vote_weight: f64,
    /// Bounded randomness injected per side, as a fraction of power
    pub random_factor: f64,
    /// Experience granted to the winner
    pub exp_per_win: u64,
    /// Health removed from the loser
    pub health_loss_per_defeat: i64,
    /// Max-health gain per level-up
    pub max_health_per_level: i64,
    /// Base of the level-up experience curve
    pub exp_base: f64,
    /// Multiplier of the level-up experience curve
    pub exp_multiplier: f64,
    /// Maximum concurrently active arena members
    pub arena_capacity: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            level_weight: 10.0,
            talent_weight: 1.0,
            vote_weight: 2.0,
            random_factor: 0.2,
            exp_per_win: 50,
            health_loss_per_defeat: 30,
            max_health_per_level: 20,
            exp_base: 100.0,
            exp_multiplier: 1.5,
            arena_capacity: 20,
        }
    }
}

impl BattleConfig {
    /// Reject configurations that would break combat or admission.
    pub fn validate(&self) -> Result<(), String> {
        if self.level_weight < 0.0 || self.talent_weight < 0.0 || self.vote_weight < 0.0 {
            return Err("power weights must be non-negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.random_factor) {
            return Err("random_factor must be within [0, 1]".to_string());
        }
        if self.exp_base <= 0.0 || self.exp_multiplier < 1.0 {
            return Err("experience curve must be positive and non-decreasing".to_string());
        }
        if self.health_loss_per_defeat < 0 || self.max_health_per_level < 0 {
            return Err("health parameters must be non-negative".to_string());
        }
        if self.arena_capacity == 0 {
            return Err("arena_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Experience required to advance from `level` to `level + 1`,
    /// floored to a whole point. Never zero, so the level-up loop always
    /// terminates.
    pub fn exp_threshold(&self, level: u32) -> u64 {
        let raw = (self.exp_base * self.exp_multiplier.powi(level.saturating_sub(1) as i32)).floor();
        (raw as u64).max(1)
    }
}

/// Everything a resolved battle produced, handed to persistence and the
/// caller, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Battle ID, shared with the durable log entry
    pub battle_id: BattleId,
    pub winner_id: FighterId,
    pub loser_id: FighterId,
    pub winner_owner: UserId,
    pub loser_owner: UserId,
    /// Deterministic power per side
    pub winner_power: f64,
    pub loser_power: f64,
    /// Power after the bounded random draw
    pub winner_final_power: f64,
    pub loser_final_power: f64,
    /// Experience granted to the winner
    pub exp_awarded: u64,
    /// Health removed from the loser (post-floor)
    pub health_lost: i64,
    /// Levels the winner gained, zero or more
    pub levels_gained: u32,
    /// True when the winner leveled up at least once
    pub level_up: bool,
    /// Loser health after the defeat, floored at zero
    pub loser_health: i64,
    /// True when the defeat killed the loser
    pub loser_died: bool,
    /// Post-shift display rows
    pub winner_position_row: u8,
    pub loser_position_row: u8,
    pub fought_at: DateTime<Utc>,
}

/// Durable battle log row derived from a [`MatchOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleLogRecord {
    pub battle_id: BattleId,
    pub winner_id: FighterId,
    pub loser_id: FighterId,
    pub winner_power: f64,
    pub loser_power: f64,
    pub winner_final_power: f64,
    pub loser_final_power: f64,
    pub exp_awarded: u64,
    pub health_lost: i64,
    pub level_up: bool,
    pub loser_died: bool,
    pub fought_at: DateTime<Utc>,
}

impl From<&MatchOutcome> for BattleLogRecord {
    fn from(outcome: &MatchOutcome) -> Self {
        Self {
            battle_id: outcome.battle_id,
            winner_id: outcome.winner_id,
            loser_id: outcome.loser_id,
            winner_power: outcome.winner_power,
            loser_power: outcome.loser_power,
            winner_final_power: outcome.winner_final_power,
            loser_final_power: outcome.loser_final_power,
            exp_awarded: outcome.exp_awarded,
            health_lost: outcome.health_lost,
            level_up: outcome.level_up,
            loser_died: outcome.loser_died,
            fought_at: outcome.fought_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BattleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = BattleConfig {
            arena_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_random_factor() {
        let config = BattleConfig {
            random_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exp_threshold_curve() {
        let config = BattleConfig {
            exp_base: 100.0,
            exp_multiplier: 1.5,
            ..Default::default()
        };
        assert_eq!(config.exp_threshold(1), 100);
        assert_eq!(config.exp_threshold(2), 150);
        // 100 * 1.5^2 = 225
        assert_eq!(config.exp_threshold(3), 225);
        // floored: 100 * 1.5^3 = 337.5
        assert_eq!(config.exp_threshold(4), 337);
    }
}
