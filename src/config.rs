//! Engine configuration constants
//!
//! Central location for validation boundaries and default values used
//! throughout the engine.

// ===== Time-of-day bounds =====

/// Maximum valid hour (24-hour time)
pub const MAX_HOUR: u8 = 23;
/// Maximum valid minute
pub const MAX_MINUTE: u8 = 59;
/// Maximum valid second
pub const MAX_SECOND: u8 = 59;

// ===== Sound limits and defaults =====

/// Maximum sound volume (inclusive, percent)
pub const MAX_VOLUME: u8 = 100;

/// Default sound volume when an alarm does not specify one
pub const DEFAULT_SOUND_VOLUME: u8 = 50;

/// How long an alarm rings when the sound duration is unspecified,
/// in milliseconds.
pub const DEFAULT_RING_DURATION_MS: u32 = 60_000;

// ===== Snooze defaults =====

/// Default snooze postponement (5 minutes)
pub const DEFAULT_SNOOZE_TIME_MS: u32 = 300_000;

/// Default number of automatic snoozes before an alarm counts as missed
pub const DEFAULT_MAX_AUTO_SNOOZE_COUNT: u32 = 3;

// ===== Reminder defaults =====

/// Default lead time for the reminder notification (5 minutes)
pub const DEFAULT_REMINDER_TIME_BEFORE_MS: u32 = 300_000;

// ===== Recurrence =====

/// Upper bound on the weekday search when resolving a repeat set.
/// A non-empty valid set always matches within one week.
pub const MAX_WEEKDAY_SEARCH_STEPS: u32 = 7;

// ===== Channels =====

/// Buffer size for the alarm signal broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Buffer size for in-process fire event delivery
pub const FIRE_CHANNEL_CAPACITY: usize = 32;
