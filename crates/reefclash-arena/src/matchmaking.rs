//! Opponent ranking by power proximity

use serde::Serialize;

use crate::combat::power;
use reefclash_types::{BattleConfig, FighterSnapshot};

/// A matchmaking candidate with its canonical power and distance to the
/// seeker.
#[derive(Debug, Clone, Serialize)]
pub struct RankedOpponent {
    pub fighter: FighterSnapshot,
    pub power: f64,
    pub power_gap: f64,
}

/// Rank opponents for a seeker: alive candidates within the level window,
/// closest power first. Uses the same canonical power formula as combat,
/// so matchmaking never disagrees with battle outcomes.
pub fn rank_opponents(
    seeker: &FighterSnapshot,
    candidates: Vec<FighterSnapshot>,
    config: &BattleConfig,
    level_window: u32,
) -> Vec<RankedOpponent> {
    let seeker_power = power(seeker, config);
    let level_min = seeker.level.saturating_sub(level_window);
    let level_max = seeker.level.saturating_add(level_window);

    let mut ranked: Vec<RankedOpponent> = candidates
        .into_iter()
        .filter(|f| {
            f.id != seeker.id
                && f.can_fight()
                && (level_min..=level_max).contains(&f.level)
        })
        .map(|fighter| {
            let candidate_power = power(&fighter, config);
            RankedOpponent {
                power: candidate_power,
                power_gap: (candidate_power - seeker_power).abs(),
                fighter,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.power_gap
            .partial_cmp(&b.power_gap)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use reefclash_types::{FighterId, UserId};

    fn fighter(level: u32, talent: u32) -> FighterSnapshot {
        FighterSnapshot {
            id: FighterId::new(),
            owner_id: UserId::new(),
            level,
            talent,
            positive_votes: 0,
            health: 100,
            max_health: 100,
            experience: 0,
            is_alive: true,
            total_wins: 0,
            total_losses: 0,
            battle_power: 0.0,
            position_row: 5,
        }
    }

    #[test]
    fn test_closest_power_ranks_first() {
        let seeker = fighter(5, 50);
        let near = fighter(5, 55);
        let far = fighter(5, 90);
        let config = BattleConfig::default();

        let ranked = rank_opponents(&seeker, vec![far.clone(), near.clone()], &config, 3);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].fighter.id, near.id);
        assert_eq!(ranked[1].fighter.id, far.id);
        assert!(ranked[0].power_gap <= ranked[1].power_gap);
    }

    #[test]
    fn test_level_window_filters() {
        let seeker = fighter(5, 50);
        let in_window = fighter(8, 50);
        let out_of_window = fighter(9, 50);
        let config = BattleConfig::default();

        let ranked = rank_opponents(
            &seeker,
            vec![in_window.clone(), out_of_window],
            &config,
            3,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].fighter.id, in_window.id);
    }

    #[test]
    fn test_dead_candidates_and_self_excluded() {
        let seeker = fighter(5, 50);
        let mut dead = fighter(5, 50);
        dead.is_alive = false;
        let config = BattleConfig::default();

        let ranked = rank_opponents(&seeker, vec![dead, seeker.clone()], &config, 3);
        assert!(ranked.is_empty());
    }
}
