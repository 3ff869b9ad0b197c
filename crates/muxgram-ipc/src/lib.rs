//! Framed IPC server for hook events.
//!
//! Hooks connect to a Unix-domain socket in the daemon's private runtime
//! directory and write newline-delimited JSON, one event per line. The
//! server accepts any number of concurrent clients; ordering is promised
//! within a connection, never across connections. Malformed lines are
//! logged and skipped without dropping the connection.
//!
//! Startup is guarded by a PID-file lock with stale-socket detection, so a
//! crashed daemon's leftovers never block the next start and two live
//! daemons never share a socket.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod framing;
mod pidfile;
mod server;

pub use error::{IpcError, IpcResult};
pub use framing::LineFramer;
pub use pidfile::PidLock;
pub use server::{Broadcaster, IpcServer};
