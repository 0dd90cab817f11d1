//! Notification text rendering
//!
//! Expands the `$time` placeholder in an alarm's notification templates and
//! picks the buttons appropriate for each notification kind. The effective
//! time includes the accumulated snooze offset, so a snoozed alarm's
//! notification shows when it will actually ring.

use crate::database::models::Alarm;
use crate::ports::{NotificationContent, NotificationKind};

/// Render the notification content for `kind`.
pub fn render(alarm: &Alarm, kind: NotificationKind) -> NotificationContent {
    let (text, snooze_button, turn_off_button) = match kind {
        NotificationKind::Main => (
            &alarm.notifications.main,
            alarm
                .notifications
                .snooze_button
                .then(|| alarm.notifications.snooze_button_text.clone()),
            alarm
                .notifications
                .turn_off_button
                .then(|| alarm.notifications.turn_off_button_text.clone()),
        ),
        NotificationKind::Reminder => (
            &alarm.reminder.text,
            None,
            Some(alarm.reminder.turn_off_button_text.clone()),
        ),
        NotificationKind::Snooze => (
            &alarm.notifications.snooze,
            None,
            Some(alarm.notifications.snooze_turn_off_button_text.clone()),
        ),
        NotificationKind::Missed => (&alarm.notifications.missed, None, None),
    };

    let time = format_alarm_time(alarm);
    NotificationContent {
        title: text.title.replace("$time", &time),
        body: text.body.replace("$time", &time),
        snooze_button,
        turn_off_button,
        launch_app: alarm.launch_app,
    }
}

/// The alarm's effective time of day (base time plus snooze offset),
/// formatted per the alarm's 12/24-hour preference. Seconds are shown only
/// when non-zero.
fn format_alarm_time(alarm: &Alarm) -> String {
    let base =
        alarm.hour as u64 * 3600 + alarm.minute as u64 * 60 + alarm.second as u64;
    let snoozed =
        alarm.snooze_count as u64 * (alarm.snooze.snooze_time_ms as u64 / 1000);
    let total = (base + snoozed) % 86_400;

    let (hour, minute, second) = (total / 3600, total % 3600 / 60, total % 60);

    if alarm.military_time {
        if second == 0 {
            format!("{}:{:02}", hour, minute)
        } else {
            format!("{}:{:02}:{:02}", hour, minute, second)
        }
    } else {
        let am_pm = if hour < 12 { "am" } else { "pm" };
        let display_hour = if hour % 12 == 0 { 12 } else { hour % 12 };
        if second == 0 {
            format!("{}:{:02} {}", display_hour, minute, am_pm)
        } else {
            format!("{}:{:02}:{:02} {}", display_hour, minute, second, am_pm)
        }
    }
}
