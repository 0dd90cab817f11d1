//! Reveille library
//!
//! A recurring alarm engine: weekday recurrence, snooze chains, early
//! reminders, timezone drift compensation, and persistence, behind
//! platform-neutral scheduler, player, and notifier ports.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod ports;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock, ZoneOffsets};
pub use database::models::{Alarm, AlarmPatch};
pub use error::{AlarmError, Result};
pub use events::AlarmSignal;
pub use services::{AlarmService, TokioScheduler};
