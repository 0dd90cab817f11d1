//! Platform collaborator interfaces
//!
//! The engine never talks to an OS alarm service, media player, or
//! notification drawer directly; platform adapters implement these traits.
//! Everything here is intentionally narrow: the engine decides *what*
//! happens, adapters decide *how*.

use crate::database::models::Alarm;
use crate::error::Result;
use async_trait::async_trait;

/// Which timer for an alarm id is being armed or delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FireKind {
    /// The main ring.
    Main,
    /// The early reminder notification.
    Reminder,
}

/// One-shot wake-up timer abstraction over the OS alarm service.
#[async_trait]
pub trait SchedulerPort: Send + Sync {
    /// Arm the timer for `id`/`kind` at the given epoch-millisecond instant,
    /// replacing any timer previously armed for that pair.
    async fn arm(&self, id: i64, kind: FireKind, at_epoch_ms: i64) -> Result<()>;

    /// Cancel both timers for `id`. Cancelling a non-existent timer is a
    /// no-op, not an error.
    async fn cancel(&self, id: i64) -> Result<()>;
}

/// What the player should ring.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSpec {
    /// Platform sound reference. `None` plays the device default.
    pub path: Option<String>,
    /// Volume 0-100.
    pub volume: u8,
    /// `None` plays for the sound's own length.
    pub duration_ms: Option<u32>,
}

impl SoundSpec {
    /// The main ring sound for an alarm.
    pub fn for_alarm(alarm: &Alarm) -> Self {
        Self {
            path: alarm.sound.path.clone(),
            volume: alarm.sound.volume,
            duration_ms: alarm.sound.duration_ms,
        }
    }

    /// The short reminder chirp for an alarm.
    pub fn for_reminder(alarm: &Alarm) -> Self {
        Self {
            path: alarm.reminder.sound_path.clone(),
            volume: alarm.reminder.sound_volume,
            duration_ms: None,
        }
    }
}

/// Sound playback abstraction. At most one main ring plays at a time.
#[async_trait]
pub trait PlayerPort: Send + Sync {
    /// Begin looping the ring sound.
    async fn start(&self, sound: SoundSpec) -> Result<()>;

    /// Stop the ring. Stopping when nothing plays is a no-op.
    async fn stop(&self) -> Result<()>;

    /// Play a short sound once without tracking it (reminder chirp).
    async fn play_once(&self, sound: SoundSpec) -> Result<()>;
}

/// The notification kinds an alarm can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Main,
    Reminder,
    Snooze,
    Missed,
}

/// Fully rendered notification content; templates and `$time` placeholders
/// have already been expanded by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Label for the snooze button, when it should be shown.
    pub snooze_button: Option<String>,
    /// Label for the turn-off button, when it should be shown.
    pub turn_off_button: Option<String>,
    /// Presentation flag, passed through from the alarm untouched.
    pub launch_app: bool,
}

/// Notification drawer abstraction.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn show(&self, id: i64, kind: NotificationKind, content: NotificationContent)
        -> Result<()>;

    /// Remove any notification shown for `id`. Idempotent.
    async fn remove(&self, id: i64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    Alarm,
    Notifications,
    LaunchApp,
}

/// Permission state abstraction. Dialog UX lives in the adapter.
#[async_trait]
pub trait PermissionPort: Send + Sync {
    async fn has(&self, kind: PermissionKind) -> bool;

    async fn request(&self, kind: PermissionKind) -> Result<bool>;
}

/// Permission provider that grants everything; suitable for hosts where
/// permissions are managed out of band, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantedPermissions;

#[async_trait]
impl PermissionPort for GrantedPermissions {
    async fn has(&self, _kind: PermissionKind) -> bool {
        true
    }

    async fn request(&self, _kind: PermissionKind) -> Result<bool> {
        Ok(true)
    }
}

/// Player that only logs. Useful for headless hosts and integration tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlayer;

#[async_trait]
impl PlayerPort for NullPlayer {
    async fn start(&self, sound: SoundSpec) -> Result<()> {
        tracing::info!("NullPlayer start: {:?}", sound);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("NullPlayer stop");
        Ok(())
    }

    async fn play_once(&self, sound: SoundSpec) -> Result<()> {
        tracing::info!("NullPlayer play_once: {:?}", sound);
        Ok(())
    }
}
