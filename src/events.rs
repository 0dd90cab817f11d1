//! Engine signals consumed by bridge/UI layers
//!
//! Emitted over a broadcast channel whenever the ringing alarm changes or
//! an alarm goes unanswered.

use crate::database::models::Alarm;
use serde::Serialize;

/// Signal emitted by the alarm state machine.
#[derive(Debug, Clone, Serialize)]
pub enum AlarmSignal {
    /// The currently ringing alarm changed: `Some` when playback starts,
    /// `None` when it ends (stop, snooze, or timeout).
    PlayingChanged(Option<Alarm>),
    /// An alarm rang out with auto-snooze exhausted and nobody answered.
    Missed(Alarm),
}
