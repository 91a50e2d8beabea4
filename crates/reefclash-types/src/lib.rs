//! Reefclash Types - Canonical domain types for the arena
//!
//! This crate contains all foundational types for reefclash with zero
//! dependencies on other reefclash crates. It defines:
//!
//! - Identity types (UserId, FighterId, BattleId)
//! - Fighter snapshots and partial-field write sets
//! - Battle configuration and combat outcome records
//! - Arena membership, queue, and status records
//!
//! # Architectural Invariants
//!
//! These types support the arena coordination invariants:
//!
//! 1. Settled active-membership count never exceeds arena capacity
//! 2. A user is in at most one of {none, queued, active}
//! 3. A dead fighter never holds active membership
//! 4. Stored battle power reflects the most recent combat only

pub mod arena;
pub mod battle;
pub mod fighter;
pub mod identity;

pub use arena::*;
pub use battle::*;
pub use fighter::*;
pub use identity::*;

/// Version of the reefclash types schema
pub const TYPES_VERSION: &str = "0.1.0";
