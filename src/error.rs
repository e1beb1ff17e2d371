//! Error types for a3s-eventstream

use thiserror::Error;

/// Errors that can occur while publishing or consuming events
#[derive(Debug, Error)]
pub enum EventError {
    /// Publish or subscribe request is malformed or incomplete
    #[error("Invalid field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Event could not be serialized into a wire record
    #[error("Unable to construct event: {0}")]
    Construction(#[from] serde_json::Error),

    /// Record value could not be decoded into an event
    #[error("Unable to decode event: {0}")]
    Decode(String),

    /// A single broker write attempt failed
    #[error("Failed to publish event to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Every write attempt for a topic failed
    #[error("Gave up publishing to topic '{topic}' after {attempts} attempts: {reason}")]
    DeliveryFailed {
        topic: String,
        attempts: u32,
        reason: String,
    },

    /// A subscription for the same topic and event name already exists
    #[error("Topic and event already registered. topic: {topic}, event: {event_name}")]
    AlreadyRegistered { topic: String, event_name: String },

    /// Broker read failure inside a consume loop
    #[error("Failed to read from topic '{topic}': {reason}")]
    Read { topic: String, reason: String },

    /// The execution context was cancelled
    #[error("Context cancelled")]
    Cancelled,

    /// Broker connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subscriber registry is unusable (poisoned lock)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A background task could not be run or panicked
    #[error("Task error: {0}")]
    Task(String),
}

impl EventError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the terminal error handed to subscribers on cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, EventError>;
