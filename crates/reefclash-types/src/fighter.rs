//! Fighter snapshot and partial-field write set

use crate::{FighterId, UserId};
use serde::{Deserialize, Serialize};

/// Number of display rows in the arena tank
pub const POSITION_ROWS: u8 = 10;

/// A point-in-time view of a fighter, owned by the persistence layer.
///
/// Cached copies are advisory and short-lived; any mutating write that
/// touches the fighter invalidates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterSnapshot {
    /// Fighter ID
    pub id: FighterId,
    /// Owning user
    pub owner_id: UserId,
    /// Current level (1-based)
    pub level: u32,
    /// Innate talent, 0-100
    pub talent: u32,
    /// Positive votes received from other users
    pub positive_votes: u32,
    /// Current health
    pub health: i64,
    /// Maximum health at the current level
    pub max_health: i64,
    /// Experience accumulated toward the next level
    pub experience: u64,
    /// Whether the fighter is alive
    pub is_alive: bool,
    /// Lifetime wins
    pub total_wins: u64,
    /// Lifetime losses
    pub total_losses: u64,
    /// Power computed at the most recent combat or recompute event
    pub battle_power: f64,
    /// Display row in the tank, 0-9
    pub position_row: u8,
}

impl FighterSnapshot {
    /// Check the fighter can enter combat
    pub fn can_fight(&self) -> bool {
        self.is_alive && self.health > 0
    }
}

/// Partial-field write set handed to the persistence layer.
///
/// Every field is optional; only the set fields are written. The win/loss
/// deltas carry atomic-increment semantics where the backend supports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FighterUpdate {
    pub level: Option<u32>,
    pub health: Option<i64>,
    pub max_health: Option<i64>,
    pub experience: Option<u64>,
    pub is_alive: Option<bool>,
    pub battle_power: Option<f64>,
    pub position_row: Option<u8>,
    /// Increment applied to total_wins
    pub wins_delta: Option<u64>,
    /// Increment applied to total_losses
    pub losses_delta: Option<u64>,
}

impl FighterUpdate {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this update to a snapshot, mirroring the persistence write.
    pub fn apply(&self, fighter: &mut FighterSnapshot) {
        if let Some(level) = self.level {
            fighter.level = level;
        }
        if let Some(health) = self.health {
            fighter.health = health;
        }
        if let Some(max_health) = self.max_health {
            fighter.max_health = max_health;
        }
        if let Some(experience) = self.experience {
            fighter.experience = experience;
        }
        if let Some(is_alive) = self.is_alive {
            fighter.is_alive = is_alive;
        }
        if let Some(battle_power) = self.battle_power {
            fighter.battle_power = battle_power;
        }
        if let Some(position_row) = self.position_row {
            fighter.position_row = position_row;
        }
        if let Some(delta) = self.wins_delta {
            fighter.total_wins += delta;
        }
        if let Some(delta) = self.losses_delta {
            fighter.total_losses += delta;
        }
    }
}
