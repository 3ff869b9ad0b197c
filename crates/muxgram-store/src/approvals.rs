//! Approval operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use muxgram_core::{ApprovalId, ApprovalRecord, ApprovalStatus};

use crate::error::StoreResult;
use crate::store::{approval_from_row, SessionStore, APPROVAL_COLUMNS};

impl SessionStore {
    /// Persist a fresh approval row.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn insert_approval(&self, record: &ApprovalRecord) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO approvals
                 (id, session_id, prompt, created_at, expires_at, status, message_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.session_id.as_str(),
                record.prompt,
                record.created_at.to_rfc3339(),
                record.expires_at.to_rfc3339(),
                record.status.as_str(),
                record.message_id,
            ],
        )?;
        Ok(())
    }

    /// Fetch one approval by id.
    ///
    /// # Errors
    ///
    /// Store-level errors only; an absent row is `Ok(None)`.
    pub fn get_approval(&self, id: &ApprovalId) -> StoreResult<Option<ApprovalRecord>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                &format!("SELECT {APPROVAL_COLUMNS} FROM approvals WHERE id = ?1"),
                params![id.as_str()],
                approval_from_row,
            )
            .optional()?;
        raw.map(super::store::RawApproval::into_record).transpose()
    }

    /// Record the chat message that carries the buttons.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn set_approval_message(&self, id: &ApprovalId, message_id: i64) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE approvals SET message_id = ?2 WHERE id = ?1",
            params![id.as_str(), message_id],
        )?;
        Ok(())
    }

    /// Move a pending approval to a terminal state.
    ///
    /// Exactly one terminal transition happens per approval: the update is
    /// guarded on `status = 'pending'` and the return value says whether
    /// this call won. A late button press after expiry (or a second press)
    /// returns `false` and must cause no side-effects.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn resolve_approval(&self, id: &ApprovalId, status: ApprovalStatus) -> StoreResult<bool> {
        debug_assert!(status != ApprovalStatus::Pending);
        let changed = self.conn().execute(
            "UPDATE approvals SET status = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id.as_str(), status.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Expire every pending approval whose deadline has passed.
    ///
    /// Returns how many rows transitioned.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn expire_approvals(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let changed = self.conn().execute(
            "UPDATE approvals SET status = 'expired'
             WHERE status = 'pending' AND expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(changed)
    }
}
