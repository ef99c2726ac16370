//! Member registration and its audit log.

mod repository;
mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use repository::{LOGS_TABLE, LogRepository, MEMBERS_TABLE, MemberRepository};
pub use service::MemberService;

/// Messages containing this marker make the log repository fail.
pub const LOG_FAILURE_MARKER: &str = "log-fail";

/// A registered member, keyed by username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            joined_at: Utc::now(),
        }
    }
}

/// An audit log entry, keyed by its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub message: String,
    pub logged_at: DateTime<Utc>,
}

impl Log {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logged_at: Utc::now(),
        }
    }

    /// Returns true if writing this entry is set up to fail.
    pub fn is_poisoned(&self) -> bool {
        self.message.contains(LOG_FAILURE_MARKER)
    }
}
