/// Application name
pub const APP_NAME: &str = "MoveSplash";

/// Number of messages requested from realtime channel history on join
pub const HISTORY_PAGE_LIMIT: usize = 50;

/// Snap lifetime used when a message is flagged ephemeral without a TTL
pub const DEFAULT_SNAP_TTL_SECS: u64 = 10;

/// Maximum characters of message text shown in a conversation preview
pub const PREVIEW_MAX_CHARS: usize = 40;

/// Separator used when deriving a direct conversation id from member ids
pub const DIRECT_ID_SEPARATOR: &str = "_";

/// Placeholder avatar service, seeded with the sender id
pub const PLACEHOLDER_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/initials/svg?seed=";
