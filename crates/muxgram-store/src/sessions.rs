//! Session operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use muxgram_core::{PaneTarget, SessionId, SessionRecord, SessionStatus};

use crate::error::StoreResult;
use crate::store::{session_from_row, SessionSeed, SessionStore, SESSION_COLUMNS};

impl SessionStore {
    /// Fetch one session by id.
    ///
    /// # Errors
    ///
    /// Fails only on store-level errors; an absent row is `Ok(None)`.
    pub fn get_session(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id.as_str()],
                session_from_row,
            )
            .optional()?;
        raw.map(super::store::RawSession::into_record).transpose()
    }

    /// Fetch the session owning a forum thread, if this daemon has one.
    ///
    /// # Errors
    ///
    /// Fails only on store-level errors; an unowned thread is `Ok(None)`.
    pub fn get_by_thread_id(&self, thread_id: i64) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE thread_id = ?1"),
                params![thread_id],
                session_from_row,
            )
            .optional()?;
        raw.map(super::store::RawSession::into_record).transpose()
    }

    /// Create a session row, idempotently on `id`.
    ///
    /// If the row already exists, `last_activity` advances and any supplied
    /// seed fields overwrite the stored annotations; the key, `started_at`,
    /// `thread_id` and `status` are left alone. Returns the resulting row.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn create_session(
        &self,
        id: &SessionId,
        chat_id: i64,
        seed: SessionSeed<'_>,
        now: DateTime<Utc>,
    ) -> StoreResult<SessionRecord> {
        {
            let conn = self.conn();
            let target = seed.tmux_target.map(ToString::to_string);
            let inserted = conn.execute(
                "INSERT INTO sessions
                     (id, chat_id, thread_id, hostname, project_dir,
                      tmux_target, tmux_socket, started_at, last_activity, status)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?7, 'active')
                 ON CONFLICT(id) DO NOTHING",
                params![
                    id.as_str(),
                    chat_id,
                    seed.hostname,
                    seed.project_dir,
                    target,
                    seed.tmux_socket,
                    now.to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                conn.execute(
                    "UPDATE sessions SET
                         last_activity = ?2,
                         hostname      = COALESCE(?3, hostname),
                         project_dir   = COALESCE(?4, project_dir),
                         tmux_target   = COALESCE(?5, tmux_target),
                         tmux_socket   = COALESCE(?6, tmux_socket)
                     WHERE id = ?1",
                    params![
                        id.as_str(),
                        now.to_rfc3339(),
                        seed.hostname,
                        seed.project_dir,
                        target,
                        seed.tmux_socket,
                    ],
                )?;
            } else {
                debug!(session = %id, chat_id, "created session row");
            }
        }
        self.get_session(id)?.ok_or_else(|| {
            crate::error::StoreError::Corrupt(format!("session {id} vanished after create"))
        })
    }

    /// Record the forum thread for a session.
    ///
    /// A thread id, once set, is never rewritten: the update only fills a
    /// NULL. Returns whether this call set it.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn set_thread_id(&self, id: &SessionId, thread_id: i64) -> StoreResult<bool> {
        let changed = self.conn().execute(
            "UPDATE sessions SET thread_id = ?2
             WHERE id = ?1 AND thread_id IS NULL",
            params![id.as_str(), thread_id],
        )?;
        Ok(changed == 1)
    }

    /// Update the pane target and (if known) the control socket.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn set_tmux(
        &self,
        id: &SessionId,
        target: &PaneTarget,
        socket: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE sessions SET
                 tmux_target = ?2,
                 tmux_socket = COALESCE(?3, tmux_socket)
             WHERE id = ?1",
            params![id.as_str(), target.to_string(), socket],
        )?;
        Ok(())
    }

    /// Advance `last_activity`.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE sessions SET last_activity = ?2 WHERE id = ?1",
            params![id.as_str(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Mark a session ended or aborted and expire its pending approvals.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn end_session(
        &self,
        id: &SessionId,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sessions SET status = ?2, last_activity = ?3 WHERE id = ?1",
            params![id.as_str(), status.as_str(), now.to_rfc3339()],
        )?;
        conn.execute(
            "UPDATE approvals SET status = 'expired'
             WHERE session_id = ?1 AND status = 'pending'",
            params![id.as_str()],
        )?;
        Ok(())
    }

    /// Bring an ended or aborted session back to `active`.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn reactivate(&self, id: &SessionId, now: DateTime<Utc>) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE sessions SET status = 'active', last_activity = ?2 WHERE id = ?1",
            params![id.as_str(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Active sessions whose `last_activity` is older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn stale_candidates(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE status = 'active' AND last_activity < ?1
             ORDER BY last_activity"
        ))?;
        let raws = stmt
            .query_map(params![cutoff.to_rfc3339()], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter()
            .map(super::store::RawSession::into_record)
            .collect()
    }

    /// Every active session, oldest activity first. Used once at startup
    /// to rebuild the in-memory caches after a restart.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn list_active(&self) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE status = 'active'
             ORDER BY last_activity"
        ))?;
        let raws = stmt
            .query_map([], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter()
            .map(super::store::RawSession::into_record)
            .collect()
    }

    /// Whether another active session currently claims this pane target.
    ///
    /// # Errors
    ///
    /// Store-level errors only.
    pub fn is_target_owned_elsewhere(
        &self,
        target: &PaneTarget,
        except: &SessionId,
    ) -> StoreResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sessions
             WHERE status = 'active' AND tmux_target = ?1 AND id != ?2",
            params![target.to_string(), except.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
