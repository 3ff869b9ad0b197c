//! Approval records and decision codec.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::session::SessionId;

/// Identifier of a pending approval, assigned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApprovalId(String);

impl ApprovalId {
    /// Mint a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an id restored from the store or a callback payload.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an approval. Exactly one terminal transition happens
/// from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Waiting for a button press.
    Pending,
    /// The user approved.
    Approved,
    /// The user rejected (including via abort).
    Rejected,
    /// The deadline passed before any button press.
    Expired,
}

impl ApprovalStatus {
    /// Stable text form used in the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised status string in the store.
#[derive(Debug, thiserror::Error)]
#[error("unknown approval status: {0}")]
pub struct ApprovalStatusParseError(String);

impl FromStr for ApprovalStatus {
    type Err = ApprovalStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(ApprovalStatusParseError(other.to_string())),
        }
    }
}

/// A button the user can press on an approval message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Let the tool call proceed.
    Approve,
    /// Deny the tool call.
    Reject,
    /// Deny and abort the whole session.
    Abort,
}

impl ApprovalDecision {
    /// Button label shown in chat.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Approve => "✅ Approve",
            Self::Reject => "❌ Reject",
            Self::Abort => "🛑 Abort session",
        }
    }

    /// One-character code used in callback data.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Approve => "a",
            Self::Reject => "r",
            Self::Abort => "x",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "a" => Some(Self::Approve),
            "r" => Some(Self::Reject),
            "x" => Some(Self::Abort),
            _ => None,
        }
    }

    /// Whether this decision counts as approval for the waiting hook.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// The persisted approval record.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRecord {
    /// Daemon-assigned id; carried in callback data.
    pub id: ApprovalId,
    /// The session whose hook is waiting on this approval.
    pub session_id: SessionId,
    /// Verbatim prompt shown to the user.
    pub prompt: String,
    /// When the request arrived.
    pub created_at: DateTime<Utc>,
    /// Deadline after which the reaper marks the row expired.
    pub expires_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: ApprovalStatus,
    /// Chat message carrying the buttons, once sent.
    pub message_id: Option<i64>,
}

impl ApprovalRecord {
    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Used by `CallbackData` in the sibling module.
pub(crate) fn decision_from_code(code: &str) -> Option<ApprovalDecision> {
    ApprovalDecision::from_code(code)
}
