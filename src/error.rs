//! Error types for the alarm engine
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized across a bridge layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid alarm configuration: {0}")]
    Validation(String),

    #[error("Alarm not found: {0}")]
    AlarmNotFound(i64),

    #[error("No valid repeat day within the next week for alarm {0}")]
    InvalidRecurrence(i64),

    #[error("Alarm {0} is not currently ringing")]
    NotCurrentlyRinging(i64),

    #[error("Alarm {ringing} is already ringing; dropping fire for alarm {requested}")]
    AlreadyRinging { ringing: i64, requested: i64 },

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl serde::Serialize for AlarmError {
    // Spelled out in full: the crate's own single-parameter `Result` alias
    // is in scope here and must not capture this return type.
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlarmError>;
