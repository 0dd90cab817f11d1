//! Alarm data model
//!
//! The persistent alarm entity plus the partial-update request. Alarms are
//! serde round-trippable and stored as one JSON document per id.

use crate::config::{
    DEFAULT_MAX_AUTO_SNOOZE_COUNT, DEFAULT_REMINDER_TIME_BEFORE_MS, DEFAULT_SNOOZE_TIME_MS,
    DEFAULT_SOUND_VOLUME, MAX_HOUR, MAX_MINUTE, MAX_SECOND, MAX_VOLUME,
};
use crate::error::{AlarmError, Result};
use serde::{Deserialize, Serialize};

/// A time-of-day alarm with an optional weekday recurrence rule.
///
/// `repeat_on_days` holds weekday digits `'1'`(Monday)..`'7'`(Sunday);
/// an empty string means the alarm fires once and then disables itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alarm {
    /// Unique, caller-assigned id. Setting an alarm with an existing id
    /// replaces the stored record.
    pub id: i64,
    /// Hour in 24-hour time (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
    /// Disabled alarms are stored but never scheduled.
    pub enabled: bool,
    pub name: Option<String>,
    /// Weekday digits `'1'`..`'7'`, Monday first. Empty = one-shot.
    pub repeat_on_days: String,
    pub sound: SoundConfig,
    pub snooze: SnoozeConfig,
    /// Times the current cycle has been snoozed. Reset to 0 whenever the
    /// alarm is fully stopped.
    pub snooze_count: u32,
    pub notifications: NotificationConfig,
    pub reminder: ReminderConfig,
    /// Presentation flag, passed through to the notifier untouched.
    pub launch_app: bool,
    /// Render `$time` in 24-hour format when true, 12-hour am/pm otherwise.
    pub military_time: bool,
    /// When true the wall-clock time floats with timezone changes; when
    /// false the engine compensates so the absolute UTC instant stays fixed.
    pub adjust_with_timezone: bool,
    /// Same as `adjust_with_timezone`, for the daylight-savings component.
    pub adjust_with_daylight_savings: bool,
    /// Device timezone offset captured when the alarm was last set.
    pub timezone_offset_ms: i64,
    /// Device DST offset captured when the alarm was last set.
    pub daylight_savings_offset_ms: i64,
    /// Opaque caller payload, stored verbatim.
    pub extra_json: Option<String>,
}

impl Default for Alarm {
    fn default() -> Self {
        Self {
            id: 0,
            hour: 0,
            minute: 0,
            second: 0,
            enabled: true,
            name: None,
            repeat_on_days: String::new(),
            sound: SoundConfig::default(),
            snooze: SnoozeConfig::default(),
            snooze_count: 0,
            notifications: NotificationConfig::default(),
            reminder: ReminderConfig::default(),
            launch_app: false,
            military_time: true,
            adjust_with_timezone: false,
            adjust_with_daylight_savings: false,
            timezone_offset_ms: 0,
            daylight_savings_offset_ms: 0,
            extra_json: None,
        }
    }
}

impl Alarm {
    /// Whether the recurrence set includes the given weekday
    /// (1 = Monday .. 7 = Sunday).
    pub fn repeats_on(&self, weekday: u32) -> bool {
        (1..=7).contains(&weekday)
            && self
                .repeat_on_days
                .contains(char::from(b'0' + weekday as u8))
    }

    /// One-shot alarms have no repeat days and disable themselves after
    /// firing once.
    pub fn is_one_shot(&self) -> bool {
        self.repeat_on_days.is_empty()
    }

    /// Reject invalid configurations before any state is mutated.
    pub fn validate(&self) -> Result<()> {
        if self.hour > MAX_HOUR {
            return Err(AlarmError::Validation(format!(
                "hour {} out of range 0-{}",
                self.hour, MAX_HOUR
            )));
        }
        if self.minute > MAX_MINUTE {
            return Err(AlarmError::Validation(format!(
                "minute {} out of range 0-{}",
                self.minute, MAX_MINUTE
            )));
        }
        if self.second > MAX_SECOND {
            return Err(AlarmError::Validation(format!(
                "second {} out of range 0-{}",
                self.second, MAX_SECOND
            )));
        }
        if self.sound.volume > MAX_VOLUME {
            return Err(AlarmError::Validation(format!(
                "sound volume {} out of range 0-{}",
                self.sound.volume, MAX_VOLUME
            )));
        }
        if self.reminder.sound_volume > MAX_VOLUME {
            return Err(AlarmError::Validation(format!(
                "reminder sound volume {} out of range 0-{}",
                self.reminder.sound_volume, MAX_VOLUME
            )));
        }
        if let Some(bad) = self.repeat_on_days.chars().find(|c| !('1'..='7').contains(c)) {
            return Err(AlarmError::Validation(format!(
                "repeat day '{}' is not a weekday digit 1-7",
                bad
            )));
        }
        Ok(())
    }

    /// Merge a partial update over this record.
    pub fn apply_patch(&mut self, patch: AlarmPatch) {
        if let Some(hour) = patch.hour {
            self.hour = hour;
        }
        if let Some(minute) = patch.minute {
            self.minute = minute;
        }
        if let Some(second) = patch.second {
            self.second = second;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(repeat_on_days) = patch.repeat_on_days {
            self.repeat_on_days = repeat_on_days;
        }
        if let Some(sound) = patch.sound {
            self.sound = sound;
        }
        if let Some(snooze) = patch.snooze {
            self.snooze = snooze;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(reminder) = patch.reminder {
            self.reminder = reminder;
        }
        if let Some(launch_app) = patch.launch_app {
            self.launch_app = launch_app;
        }
        if let Some(military_time) = patch.military_time {
            self.military_time = military_time;
        }
        if let Some(adjust_with_timezone) = patch.adjust_with_timezone {
            self.adjust_with_timezone = adjust_with_timezone;
        }
        if let Some(adjust_with_daylight_savings) = patch.adjust_with_daylight_savings {
            self.adjust_with_daylight_savings = adjust_with_daylight_savings;
        }
        if let Some(extra_json) = patch.extra_json {
            self.extra_json = Some(extra_json);
        }
    }
}

/// Sound playback settings for the main ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Platform sound reference. `None` plays the device default.
    pub path: Option<String>,
    /// How long the ring lasts. `None` plays for the sound's own length.
    pub duration_ms: Option<u32>,
    /// Volume 0-100.
    pub volume: u8,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            path: None,
            duration_ms: None,
            volume: DEFAULT_SOUND_VOLUME,
        }
    }
}

/// Snooze behavior.
///
/// Snooze time is added onto the original alarm time, so repeated snoozes
/// accumulate deterministically regardless of when the button was pressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoozeConfig {
    pub snooze_time_ms: u32,
    /// Automatic snoozes allowed before a timed-out alarm counts as missed.
    pub max_auto_snooze_count: u32,
    pub auto_snooze_enabled: bool,
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            snooze_time_ms: DEFAULT_SNOOZE_TIME_MS,
            max_auto_snooze_count: DEFAULT_MAX_AUTO_SNOOZE_COUNT,
            auto_snooze_enabled: true,
        }
    }
}

/// Title/body template pair. `$time` expands to the effective alarm time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationText {
    pub title: String,
    pub body: String,
}

impl NotificationText {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// Per-kind notification templates and button flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub show_main: bool,
    pub main: NotificationText,
    pub snooze_button: bool,
    pub snooze_button_text: String,
    pub turn_off_button: bool,
    pub turn_off_button_text: String,
    pub show_snooze: bool,
    pub snooze: NotificationText,
    pub snooze_turn_off_button_text: String,
    pub show_missed: bool,
    pub missed: NotificationText,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            show_main: true,
            main: NotificationText::new("Alarm at $time", ""),
            snooze_button: false,
            snooze_button_text: "Snooze".to_string(),
            turn_off_button: false,
            turn_off_button_text: "Turn Off".to_string(),
            show_snooze: true,
            snooze: NotificationText::new("Alarm snoozed until $time", ""),
            snooze_turn_off_button_text: "Turn Off".to_string(),
            show_missed: true,
            missed: NotificationText::new("Missed alarm at $time", ""),
        }
    }
}

/// Secondary notification shown ahead of the main fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Lead time before the main fire, in milliseconds.
    pub time_before_ms: u32,
    pub sound_path: Option<String>,
    pub sound_volume: u8,
    pub text: NotificationText,
    /// The reminder's turn-off button skips the alarm for the day.
    pub turn_off_button_text: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_before_ms: DEFAULT_REMINDER_TIME_BEFORE_MS,
            sound_path: None,
            sound_volume: DEFAULT_SOUND_VOLUME,
            text: NotificationText::new("Upcoming alarm at $time", ""),
            turn_off_button_text: "Turn Off For Today".to_string(),
        }
    }
}

/// Partial update over a stored alarm. `None` fields keep their current
/// values; nested sections are replaced whole.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlarmPatch {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub repeat_on_days: Option<String>,
    pub sound: Option<SoundConfig>,
    pub snooze: Option<SnoozeConfig>,
    pub notifications: Option<NotificationConfig>,
    pub reminder: Option<ReminderConfig>,
    pub launch_app: Option<bool>,
    pub military_time: Option<bool>,
    pub adjust_with_timezone: Option<bool>,
    pub adjust_with_daylight_savings: Option<bool>,
    pub extra_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alarm_is_valid() {
        Alarm::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_time_fields() {
        let alarm = Alarm {
            hour: 24,
            ..Alarm::default()
        };
        assert!(matches!(
            alarm.validate(),
            Err(crate::error::AlarmError::Validation(_))
        ));

        let alarm = Alarm {
            minute: 60,
            ..Alarm::default()
        };
        assert!(alarm.validate().is_err());

        let alarm = Alarm {
            second: 61,
            ..Alarm::default()
        };
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn rejects_volume_above_limit() {
        let alarm = Alarm {
            sound: SoundConfig {
                volume: 101,
                ..SoundConfig::default()
            },
            ..Alarm::default()
        };
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn rejects_malformed_repeat_days() {
        for bad in ["8", "0", "12x", "monday"] {
            let alarm = Alarm {
                repeat_on_days: bad.to_string(),
                ..Alarm::default()
            };
            assert!(alarm.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn weekday_membership_uses_monday_first_numbering() {
        let alarm = Alarm {
            repeat_on_days: "67".to_string(),
            ..Alarm::default()
        };

        assert!(!alarm.repeats_on(1)); // Monday
        assert!(!alarm.repeats_on(5)); // Friday
        assert!(alarm.repeats_on(6)); // Saturday
        assert!(alarm.repeats_on(7)); // Sunday
        assert!(!alarm.repeats_on(0));
        assert!(!alarm.repeats_on(8));
    }

    #[test]
    fn patch_merges_only_provided_fields() {
        let mut alarm = Alarm {
            id: 3,
            hour: 7,
            minute: 30,
            repeat_on_days: "12345".to_string(),
            ..Alarm::default()
        };

        alarm.apply_patch(AlarmPatch {
            hour: Some(8),
            sound: Some(SoundConfig {
                volume: 75,
                ..SoundConfig::default()
            }),
            ..AlarmPatch::default()
        });

        assert_eq!(alarm.hour, 8);
        assert_eq!(alarm.minute, 30);
        assert_eq!(alarm.sound.volume, 75);
        assert_eq!(alarm.repeat_on_days, "12345");
    }

    #[test]
    fn alarm_round_trips_through_json() {
        let alarm = Alarm {
            id: 42,
            hour: 6,
            minute: 45,
            repeat_on_days: "135".to_string(),
            name: Some("workout".to_string()),
            ..Alarm::default()
        };

        let json = serde_json::to_string(&alarm).unwrap();
        let back: Alarm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alarm);
    }

    #[test]
    fn sparse_json_fills_defaults() {
        let alarm: Alarm = serde_json::from_str(r#"{"id": 9, "hour": 7}"#).unwrap();

        assert_eq!(alarm.id, 9);
        assert_eq!(alarm.hour, 7);
        assert!(alarm.enabled);
        assert_eq!(alarm.snooze.snooze_time_ms, DEFAULT_SNOOZE_TIME_MS);
        assert!(alarm.is_one_shot());
    }
}
