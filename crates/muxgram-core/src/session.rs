//! Session identity and the persisted session record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::PaneTarget;

/// Opaque session identifier assigned by the upstream CLI.
///
/// Every hook event carries one; it is the primary key of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an upstream-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix suitable for thread titles and log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of a session.
///
/// Only `Active` is externally observable; an ended or aborted session is
/// reactivated by any further event for its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The upstream CLI is (believed to be) running.
    Active,
    /// Ended by an explicit `session_end` event or by the stale reaper.
    Ended,
    /// Aborted by the administrator through the approval flow.
    Aborted,
}

impl SessionStatus {
    /// Stable text form used in the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised status string in the store.
#[derive(Debug, thiserror::Error)]
#[error("unknown session status: {0}")]
pub struct StatusParseError(String);

impl FromStr for SessionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            "aborted" => Ok(Self::Aborted),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// The persisted session record.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Primary key; assigned upstream.
    pub id: SessionId,
    /// The chat this daemon serves.
    pub chat_id: i64,
    /// Forum thread created for this session, once known.
    pub thread_id: Option<i64>,
    /// Display annotation from event metadata.
    pub hostname: Option<String>,
    /// Display annotation from event metadata.
    pub project_dir: Option<String>,
    /// Pane currently hosting the upstream CLI.
    pub tmux_target: Option<PaneTarget>,
    /// Control socket of the multiplexer server owning the pane.
    pub tmux_socket: Option<String>,
    /// When the first event for this id arrived.
    pub started_at: DateTime<Utc>,
    /// Advanced on every event touching the session.
    pub last_activity: DateTime<Utc>,
    /// Lifecycle state.
    pub status: SessionStatus,
}

impl SessionRecord {
    /// Whether the session is in the externally observable state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Title for the forum thread of this session.
    ///
    /// Combines the hostname, the last component of the project directory
    /// and a short id prefix; omits pieces that were never reported.
    #[must_use]
    pub fn thread_title(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(host) = &self.hostname {
            parts.push(host.clone());
        }
        if let Some(dir) = &self.project_dir {
            let tail = dir.rsplit('/').find(|s| !s.is_empty()).unwrap_or(dir);
            parts.push(tail.to_string());
        }
        parts.push(self.id.short().to_string());
        parts.join(" · ")
    }
}
