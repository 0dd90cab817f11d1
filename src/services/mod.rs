//! Services module
//!
//! Business logic services that coordinate between the public API and the
//! repository and platform ports.

pub mod alarms;
pub mod calculator;
pub mod notifications;
pub mod scheduler;

pub use alarms::AlarmService;
pub use scheduler::{FireEvent, TokioScheduler};
