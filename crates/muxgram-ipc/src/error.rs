//! IPC error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from IPC startup and operation.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Another daemon instance holds the PID lock.
    #[error("another instance is already running (pid {pid:?})")]
    AlreadyRunning {
        /// The other instance's PID, when readable from the lock file.
        pid: Option<i32>,
    },

    /// The socket path is owned by a live listener.
    #[error("socket {0} is owned by a live listener")]
    SocketInUse(PathBuf),

    /// Filesystem or socket I/O failed.
    #[error("ipc i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
