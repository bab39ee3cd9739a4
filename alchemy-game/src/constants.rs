//! Centralized tuning constants for the Daily Alchemy engine.
//!
//! Values that define puzzle numbering, retry pacing and persisted key names
//! live here so they can only change through reviewed code.

// Puzzle clock ---------------------------------------------------------------
pub const LAUNCH_YEAR: i32 = 2025;
pub const LAUNCH_MONTH: u32 = 1;
pub const LAUNCH_DAY: u32 = 1;
pub(crate) const SECONDS_PER_DAY: i64 = 86_400;

// Base elements --------------------------------------------------------------
/// The four elements every bank starts with, as (name, glyph).
pub const BASE_ELEMENTS: [(&str, &str); 4] = [
    ("Fire", "🔥"),
    ("Water", "💧"),
    ("Earth", "🌍"),
    ("Air", "💨"),
];

// Glyph limits ---------------------------------------------------------------
pub const GLYPH_MIN_CLUSTERS: usize = 1;
pub const GLYPH_MAX_CLUSTERS: usize = 8;
pub const GLYPH_WIDE_LAYOUT_CLUSTERS: usize = 3;
pub(crate) const FALLBACK_GLYPH: &str = "❔";

// Combination retry ----------------------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 250;
pub const RETRY_FACTOR: u32 = 2;
pub const RETRY_MAX_RETRIES: u32 = 3;
pub const RETRY_JITTER: f64 = 0.2;
pub const SOURCE_BUDGET_SECS: u64 = 15;

// Session --------------------------------------------------------------------
pub const RECENT_ELEMENTS_CAP: usize = 5;
pub const NO_COMBINATION_MESSAGE: &str = "These don't combine";
pub const TRANSIENT_FAILURE_MESSAGE: &str = "Couldn't reach the lab. Try again.";
pub(crate) const DEFAULT_GAME_KEY: &str = "alchemy";

// Share text -----------------------------------------------------------------
pub const SHARE_TITLE: &str = "Daily Alchemy";
pub const SHARE_MAX_PATH_LINES: usize = 8;

// Storage key suffixes -------------------------------------------------------
pub(crate) const KEY_COMBINATION_CACHE: &str = "combination_cache";
pub(crate) const KEY_DISCOVERY_BANK: &str = "discovery_bank";
pub(crate) const KEY_SESSION_PREFIX: &str = "session";
pub(crate) const KEY_STATS: &str = "stats";
pub(crate) const KEY_ACHIEVEMENTS: &str = "unlocked_achievements";
pub(crate) const QUARANTINE_SUFFIX: &str = "corrupt";

// Logging keys ---------------------------------------------------------------
pub(crate) const LOG_TIER_FALLBACK: &str = "storage.tier-fallback";
pub(crate) const LOG_QUARANTINE: &str = "storage.quarantine";
pub(crate) const LOG_SOURCE_RETRY: &str = "oracle.source-retry";
pub(crate) const LOG_SOURCE_EXHAUSTED: &str = "oracle.source-exhausted";
pub(crate) const LOG_MEMO_PERSIST_FAILED: &str = "oracle.memo-persist-failed";
pub(crate) const LOG_PHASE_CHANGE: &str = "session.phase";
pub(crate) const LOG_ACHIEVEMENT: &str = "stats.achievement";
