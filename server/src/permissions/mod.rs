//! Permission system: rank-priority hierarchy guards and the
//! per-request permission resolver.

pub mod hierarchy;
pub mod resolver;

pub use hierarchy::{
    can_assign_rank, can_manage_user, effective_priority, ensure_can_moderate, PermissionError,
};
pub use resolver::{has_permission, PermissionCache};

/// Permission slug gating rank management and user-rank assignment.
pub const MANAGE_USER_RANKS: &str = "manage_user_ranks";
/// Permission slug gating rank catalog edits.
pub const MANAGE_RANKS: &str = "manage_ranks";
/// Permission slug gating room catalog edits.
pub const MANAGE_ROOMS: &str = "manage_rooms";
/// Permission slug gating kicks.
pub const KICK_USER: &str = "kick_user";
/// Permission slug gating timed mutes.
pub const MUTE_TEMP: &str = "mute_temp";
/// Permission slug gating permanent mutes.
pub const MUTE_PERM: &str = "mute_perm";
/// Permission slug gating bans (and exempting moderators from ban gates).
pub const BAN_ROOM_ACCESS: &str = "ban_room_access";
/// Permission slug for reading chat transcripts.
pub const CHAT_READ: &str = "chat.read";
/// Permission slug for sending chat messages.
pub const CHAT_WRITE: &str = "chat.write";
/// Permission slug exempting staff from room level floors.
pub const BYPASS_LEVEL_LOCK: &str = "bypass.level_lock";
