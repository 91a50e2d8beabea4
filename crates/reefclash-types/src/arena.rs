//! Arena membership, queue, and status records

use crate::{FighterId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A capacity slot held by a user's fighter.
///
/// Exists only while the user occupies a slot; created on admission,
/// destroyed on leave, death, or heartbeat-timeout eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMembership {
    pub user_id: UserId,
    pub fighter_id: FighterId,
    pub joined_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl ActiveMembership {
    /// Create a membership admitted at `now`.
    pub fn admitted_at(user_id: UserId, fighter_id: FighterId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            fighter_id,
            joined_at: now,
            last_heartbeat: now,
        }
    }

    /// True when the last heartbeat is older than the liveness window.
    pub fn is_expired(&self, now: DateTime<Utc>, liveness_window: chrono::Duration) -> bool {
        now - self.last_heartbeat > liveness_window
    }
}

/// A waiting slot taken while the arena is at capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub fighter_id: FighterId,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a join request. Queueing is a deferred success, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// The user holds an active membership
    Admitted,
    /// The arena is full; the user waits in the FIFO queue
    Queued {
        /// 1-based position in the queue
        position: u64,
        /// Total queue length
        queue_length: u64,
        /// Heuristic wait estimate, not a guarantee
        estimated_wait_secs: u64,
    },
}

impl JoinOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Point-in-time arena view for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaStatus {
    /// The user holds an active membership
    pub active: bool,
    /// The user waits in the queue
    pub queued: bool,
    /// 1-based queue position when queued
    pub position: Option<u64>,
    pub queue_length: u64,
    pub active_count: u64,
    pub capacity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_membership_expiry() {
        let now = Utc::now();
        let membership = ActiveMembership::admitted_at(UserId::new(), FighterId::new(), now);
        let window = Duration::minutes(30);

        assert!(!membership.is_expired(now, window));
        assert!(!membership.is_expired(now + Duration::minutes(29), window));
        assert!(membership.is_expired(now + Duration::minutes(31), window));
    }

    #[test]
    fn test_join_outcome_predicates() {
        assert!(JoinOutcome::Admitted.is_admitted());
        let queued = JoinOutcome::Queued {
            position: 1,
            queue_length: 1,
            estimated_wait_secs: 90,
        };
        assert!(!queued.is_admitted());
    }
}
