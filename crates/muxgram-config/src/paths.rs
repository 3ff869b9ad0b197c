//! Runtime directory layout and socket-path limits.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

/// Maximum Unix socket path length the platform's `sun_path` accepts.
#[must_use]
pub fn unix_socket_path_max() -> usize {
    // 104 on the BSD family (including macOS), 108 on Linux.
    if cfg!(target_os = "linux") {
        108
    } else {
        104
    }
}

/// The daemon's on-disk layout inside its user-private runtime directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// The runtime root (mode 0700 once ensured).
    pub root: PathBuf,
    /// Unix socket the IPC server binds.
    pub socket: PathBuf,
    /// PID file guarding single-instance startup.
    pub pid_file: PathBuf,
    /// SQLite session store.
    pub store: PathBuf,
    /// Debug log file (written only when enabled).
    pub debug_log: PathBuf,
}

impl RuntimePaths {
    /// Resolve the layout from an optional root override and an optional
    /// socket override.
    ///
    /// If the computed socket path would overflow the platform's
    /// `sun_path` limit, an ephemeral per-uid path under `/tmp` is used
    /// instead, with a warning. An *overridden* socket path that overflows
    /// is an error: the operator asked for something the kernel cannot
    /// bind.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoHome`] when no root can be determined,
    /// [`ConfigError::SocketPathTooLong`] for an oversized explicit
    /// override.
    pub fn resolve(
        root_override: Option<PathBuf>,
        socket_override: Option<PathBuf>,
    ) -> ConfigResult<Self> {
        let root = match root_override {
            Some(dir) => dir,
            None => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".muxgram"))
                .ok_or(ConfigError::NoHome)?,
        };

        let max = unix_socket_path_max();
        let socket = match socket_override {
            Some(path) => {
                let len = path.as_os_str().len();
                if len > max {
                    return Err(ConfigError::SocketPathTooLong {
                        len,
                        max,
                        path: path.display().to_string(),
                    });
                }
                path
            }
            None => {
                let preferred = root.join("bridge.sock");
                if preferred.as_os_str().len() > max {
                    let fallback = fallback_socket_path();
                    warn!(
                        preferred = %preferred.display(),
                        fallback = %fallback.display(),
                        max,
                        "socket path exceeds the platform limit; using ephemeral fallback"
                    );
                    fallback
                } else {
                    preferred
                }
            }
        };

        Ok(Self {
            pid_file: root.join("bridge.pid"),
            store: root.join("sessions.db"),
            debug_log: root.join("daemon.log"),
            root,
            socket,
        })
    }

    /// Create the runtime root (and the socket's parent, if different)
    /// with mode 0700.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors; the daemon cannot run without its
    /// private directory.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        ensure_private_dir(&self.root)?;
        if let Some(parent) = self.socket.parent() {
            if parent != self.root.as_path() {
                ensure_private_dir(parent)?;
            }
        }
        Ok(())
    }
}

fn ensure_private_dir(dir: &Path) -> ConfigResult<()> {
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

fn fallback_socket_path() -> PathBuf {
    let uid = nix::unistd::geteuid().as_raw();
    PathBuf::from(format!("/tmp/muxgram-{uid}/bridge.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_the_root() {
        let paths =
            RuntimePaths::resolve(Some(PathBuf::from("/tmp/mx")), None).unwrap();
        assert_eq!(paths.root, PathBuf::from("/tmp/mx"));
        assert_eq!(paths.socket, PathBuf::from("/tmp/mx/bridge.sock"));
        assert_eq!(paths.pid_file, PathBuf::from("/tmp/mx/bridge.pid"));
        assert_eq!(paths.store, PathBuf::from("/tmp/mx/sessions.db"));
        assert_eq!(paths.debug_log, PathBuf::from("/tmp/mx/daemon.log"));
    }

    #[test]
    fn socket_at_exactly_the_limit_is_accepted() {
        let max = unix_socket_path_max();
        let path = PathBuf::from(format!("/{}", "s".repeat(max - 1)));
        assert_eq!(path.as_os_str().len(), max);
        let paths = RuntimePaths::resolve(Some(PathBuf::from("/tmp/mx")), Some(path.clone()))
            .unwrap();
        assert_eq!(paths.socket, path);
    }

    #[test]
    fn overridden_socket_one_byte_over_is_an_error() {
        let max = unix_socket_path_max();
        let path = PathBuf::from(format!("/{}", "s".repeat(max)));
        assert!(matches!(
            RuntimePaths::resolve(Some(PathBuf::from("/tmp/mx")), Some(path)),
            Err(ConfigError::SocketPathTooLong { .. })
        ));
    }

    #[test]
    fn long_root_falls_back_to_ephemeral_socket() {
        let max = unix_socket_path_max();
        let root = PathBuf::from(format!("/{}", "d".repeat(max)));
        let paths = RuntimePaths::resolve(Some(root.clone()), None).unwrap();
        // Store and pid stay under the (long) root; only the socket moves.
        assert_eq!(paths.store, root.join("sessions.db"));
        assert!(paths.socket.starts_with("/tmp"));
        assert!(paths.socket.as_os_str().len() <= max);
    }

    #[test]
    fn ensure_dirs_creates_mode_0700() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("runtime");
        let paths = RuntimePaths::resolve(Some(root.clone()), None).unwrap();
        paths.ensure_dirs().unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn ensure_dirs_creates_fallback_socket_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("runtime");
        let sock_dir = tmp.path().join("elsewhere");
        let paths = RuntimePaths::resolve(
            Some(root),
            Some(sock_dir.join("bridge.sock")),
        )
        .unwrap();
        paths.ensure_dirs().unwrap();
        let mode = fs::metadata(&sock_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
