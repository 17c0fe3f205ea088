//! Log event type

use crate::Level;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single log event, captured at the call site.
///
/// Records are immutable once built and are rendered exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Severity
    pub level: Level,
    /// The log message
    pub message: String,
    /// Extra values rendered alongside the message, in call order
    pub attachments: Vec<Value>,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Create a new record stamped with the current time
    #[inline]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style method for setting attachments
    #[inline]
    #[must_use]
    pub fn with_attachments(mut self, attachments: &[Value]) -> Self {
        self.attachments = attachments.to_vec();
        self
    }

    /// Builder-style method for setting the timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
