//! Ranks
//!
//! Rank catalog management and user-rank assignment, gated by the
//! hierarchy guards in `crate::permissions`.

pub mod handlers;
pub mod service;
pub mod types;

pub use types::RankError;
