//! Persistence repositories

pub mod fighters;

pub use fighters::{FighterStore, PgFighterStore};
