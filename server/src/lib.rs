//! Rookery Server
//!
//! Self-hosted chat platform backend. The core is a rank-priority
//! authorization hierarchy, an append-only mute/ban ledger, and a
//! rate-limited experience-point award primitive.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod levels;
pub mod moderation;
pub mod permissions;
pub mod ranks;
pub mod rooms;
pub mod xp;

#[cfg(test)]
mod redis_tests;
