//! Schema creation and idempotent migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreResult;

/// Create tables and indexes if absent, then migrate older files forward.
pub(crate) fn init(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            chat_id       INTEGER NOT NULL,
            thread_id     INTEGER,
            hostname      TEXT,
            project_dir   TEXT,
            tmux_target   TEXT,
            tmux_socket   TEXT,
            started_at    TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'active'
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_thread
            ON sessions(thread_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_status
            ON sessions(status);
        CREATE TABLE IF NOT EXISTS approvals (
            id         TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            prompt     TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            status     TEXT NOT NULL DEFAULT 'pending',
            message_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_approvals_session
            ON approvals(session_id);",
    )?;
    migrate(conn)?;
    Ok(())
}

/// Add columns introduced after the first release.
///
/// Files created by the current schema already have them; files from older
/// daemons gain them here with NULL for existing rows. Columns are never
/// dropped or narrowed.
fn migrate(conn: &Connection) -> StoreResult<()> {
    let existing = column_names(conn, "sessions")?;
    for (column, definition) in [
        ("tmux_target", "tmux_target TEXT"),
        ("tmux_socket", "tmux_socket TEXT"),
    ] {
        if !existing.iter().any(|name| name == column) {
            conn.execute(
                &format!("ALTER TABLE sessions ADD COLUMN {definition}"),
                [],
            )?;
            info!(column, "migrated sessions table");
        }
    }
    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
