//! Watch events for a single resource identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One event from a watch stream, in delivery order.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent {
    Added(Json),
    Modified(Json),
    Deleted(Json),
    /// Out-of-band status reported by the server in place of an object.
    Error(ErrorStatus),
}

impl WatchEvent {
    /// The object payload, if this event carries one.
    pub fn object(&self) -> Option<&Json> {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => Some(o),
            WatchEvent::Error(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "ADDED",
            WatchEvent::Modified(_) => "MODIFIED",
            WatchEvent::Deleted(_) => "DELETED",
            WatchEvent::Error(_) => "ERROR",
        }
    }
}

impl fmt::Debug for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::Error(e) => write!(f, "Error event: {:?}", e),
            other => write!(f, "{} event", other.type_name()),
        }
    }
}

/// Status payload of an `ERROR` watch event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub code: u16,
}

impl ErrorStatus {
    /// Server discarded the watch cursor ("too old resource version"); the watch can
    /// be resumed after re-fetching the object.
    pub fn is_expired(&self) -> bool {
        self.message.contains("too old resource version")
            || (self.code == 410 && matches!(self.reason.as_str(), "Expired" | "Gone"))
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{} (code {})", self.message, self.code)
        } else {
            write!(f, "{}: {} (code {})", self.reason, self.message, self.code)
        }
    }
}
