//! Moderation
//!
//! Kick, mute and ban operations with a persistent restriction ledger,
//! plus the broadcast events they emit.

pub mod events;
pub mod handlers;
pub mod service;
pub mod types;

pub use events::{ModerationEvent, RestrictionAction};
pub use types::ModerationError;
