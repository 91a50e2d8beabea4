//! Reefclash Arena - capacity-bounded combat coordination
//!
//! This crate admits users into a capacity-bounded shared arena and
//! deterministically resolves combat between two admitted fighters, while
//! keeping hot per-entity reads cheap through a write-invalidate snapshot
//! cache.
//!
//! # Components
//!
//! - **AdmissionController**: bounded membership set + FIFO waiting queue
//!   + heartbeat-based liveness eviction
//! - **CombatResolver**: pure function computing power, injecting bounded
//!   randomness, producing winner/loser, experience, leveling, health, and
//!   position deltas
//! - **ArenaCoordinator**: composition root used by request handlers,
//!   orchestrating admission, combat, the snapshot cache, and persistence
//!
//! # Concurrency Model
//!
//! Handlers are stateless and short-lived, run concurrently across
//! processes, and share no in-process memory. Coordination happens only
//! through atomic operations on the shared store: admission inserts the
//! membership optimistically, re-checks cardinality, and compensates by
//! moving the offending entry to the queue head when over capacity. On
//! shared-store unavailability every operation fails closed.
//!
//! # Example
//!
//! ```ignore
//! use reefclash_arena::{AdmissionController, AdmissionSettings, ArenaCoordinator};
//!
//! let store = Store::connect(StoreConfig::from_env()).await?;
//! let coordinator = ArenaCoordinator::new(
//!     Arc::new(store.fighters()),
//!     Arc::new(store.snapshot_cache()),
//!     AdmissionController::new(Arc::new(store.arena_state()), AdmissionSettings::default()),
//!     Arc::new(TracingNotifier),
//!     CacheTtls::default(),
//! );
//!
//! match coordinator.join(user_id, fighter_id).await? {
//!     JoinOutcome::Admitted => { /* fight */ }
//!     JoinOutcome::Queued { position, .. } => { /* poll status */ }
//! }
//! ```

pub mod admission;
pub mod combat;
pub mod coordinator;
pub mod matchmaking;
pub mod notify;

pub use admission::{AdmissionController, AdmissionSettings, JoinResult, LeaveResult, StatusResult};
pub use combat::{power, resolve, ResolvedCombat};
pub use coordinator::{ArenaCoordinator, CacheTtls, DEFAULT_LEVEL_WINDOW};
pub use matchmaking::{rank_opponents, RankedOpponent};
pub use notify::{NoopNotifier, PromotionNotifier, TracingNotifier};

use reefclash_store::StoreError;
use thiserror::Error;

/// Arena errors surfaced to request handlers.
///
/// Queueing is a deferred success ([`reefclash_types::JoinOutcome::Queued`]),
/// never an error.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Bad input; retryable after the input is fixed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown fighter or user; terminal for the request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Shared store unreachable; the request must not proceed on
    /// stale or default state
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Any other persistence failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ArenaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) | StoreError::Connection(msg) => {
                ArenaError::Unavailable(msg)
            }
            StoreError::NotFound(msg) => ArenaError::NotFound(msg),
            other => ArenaError::Store(other),
        }
    }
}

/// Result type for arena operations
pub type ArenaResult<T> = Result<T, ArenaError>;
