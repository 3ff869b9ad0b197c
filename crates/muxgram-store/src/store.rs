//! The store handle and row mapping shared by the session and approval
//! operation modules.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use muxgram_core::{
    ApprovalId, ApprovalRecord, ApprovalStatus, PaneTarget, SessionId, SessionRecord,
    SessionStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// Handle to the SQLite store.
///
/// Cheap to share behind an `Arc`; every operation takes the connection
/// mutex for the duration of one short transaction.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

/// Mutable fields supplied when a session is first seen (or re-announced).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSeed<'a> {
    /// Host annotation, if the event reported one.
    pub hostname: Option<&'a str>,
    /// Project directory annotation.
    pub project_dir: Option<&'a str>,
    /// Pane hosting the CLI.
    pub tmux_target: Option<&'a PaneTarget>,
    /// Multiplexer control socket.
    pub tmux_socket: Option<&'a str>,
}

impl SessionStore {
    /// Open (and migrate) the store file, creating it if absent.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal to the daemon: it cannot run without
    /// consistent durable state.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (tests).
    ///
    /// # Errors
    ///
    /// See [`SessionStore::open`].
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-transaction in another thread;
        // the connection itself is still usable for the next statement.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        thread_id: row.get(2)?,
        hostname: row.get(3)?,
        project_dir: row.get(4)?,
        tmux_target: row.get(5)?,
        tmux_socket: row.get(6)?,
        started_at: row.get(7)?,
        last_activity: row.get(8)?,
        status: row.get(9)?,
    })
}

/// Column order used by every session SELECT.
pub(crate) const SESSION_COLUMNS: &str = "id, chat_id, thread_id, hostname, project_dir, \
     tmux_target, tmux_socket, started_at, last_activity, status";

/// A session row before text fields are interpreted.
pub(crate) struct RawSession {
    id: String,
    chat_id: i64,
    thread_id: Option<i64>,
    hostname: Option<String>,
    project_dir: Option<String>,
    tmux_target: Option<String>,
    tmux_socket: Option<String>,
    started_at: String,
    last_activity: String,
    status: String,
}

impl RawSession {
    pub(crate) fn into_record(self) -> StoreResult<SessionRecord> {
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{e}")))?;
        let tmux_target = match self.tmux_target {
            None => None,
            Some(raw) => Some(
                raw.parse::<PaneTarget>()
                    .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            ),
        };
        Ok(SessionRecord {
            id: SessionId::from(self.id),
            chat_id: self.chat_id,
            thread_id: self.thread_id,
            hostname: self.hostname,
            project_dir: self.project_dir,
            tmux_target,
            tmux_socket: self.tmux_socket,
            started_at: parse_timestamp(&self.started_at)?,
            last_activity: parse_timestamp(&self.last_activity)?,
            status,
        })
    }
}

pub(crate) fn approval_from_row(row: &Row<'_>) -> rusqlite::Result<RawApproval> {
    Ok(RawApproval {
        id: row.get(0)?,
        session_id: row.get(1)?,
        prompt: row.get(2)?,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        status: row.get(5)?,
        message_id: row.get(6)?,
    })
}

/// Column order used by every approval SELECT.
pub(crate) const APPROVAL_COLUMNS: &str =
    "id, session_id, prompt, created_at, expires_at, status, message_id";

/// An approval row before text fields are interpreted.
pub(crate) struct RawApproval {
    id: String,
    session_id: String,
    prompt: String,
    created_at: String,
    expires_at: String,
    status: String,
    message_id: Option<i64>,
}

impl RawApproval {
    pub(crate) fn into_record(self) -> StoreResult<ApprovalRecord> {
        let status: ApprovalStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{e}")))?;
        Ok(ApprovalRecord {
            id: ApprovalId::new(self.id),
            session_id: SessionId::from(self.session_id),
            prompt: self.prompt,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
            status,
            message_id: self.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");
        let _store = SessionStore::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopen_preserves_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");
        let now = Utc::now();
        {
            let store = SessionStore::open(&path).unwrap();
            store
                .create_session(&SessionId::from("s1"), 7, SessionSeed::default(), now)
                .unwrap();
        }
        let store = SessionStore::open(&path).unwrap();
        let record = store.get_session(&SessionId::from("s1")).unwrap().unwrap();
        assert_eq!(record.chat_id, 7);
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
