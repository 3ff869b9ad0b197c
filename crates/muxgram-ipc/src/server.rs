//! The Unix-socket event server.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use muxgram_core::{Envelope, OutboundEvent};

use crate::error::{IpcError, IpcResult};
use crate::framing::LineFramer;
use crate::pidfile::PidLock;

/// How long the stale-socket probe waits for a connect before declaring
/// the file dead.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Capacity of the downstream broadcast channel. A hook that cannot keep
/// up misses old lines rather than blocking the daemon.
const DOWNSTREAM_CAPACITY: usize = 64;

/// Read buffer size per connection.
const READ_BUF: usize = 4096;

/// Handle for broadcasting downstream events to every connected client.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
}

impl Broadcaster {
    /// A broadcaster with no server behind it (tests, threads-only runs);
    /// sends go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        let (tx, _) = broadcast::channel(DOWNSTREAM_CAPACITY);
        Self { tx }
    }

    /// Send one event to all connected clients. Clients that joined after
    /// the send, or that are lagging, miss it; approvals answered twice
    /// are reconciled by the hook side.
    pub fn send(&self, event: &OutboundEvent) {
        match event.to_line() {
            Ok(line) => {
                let receivers = self.tx.send(line).unwrap_or(0);
                debug!(receivers, "broadcast downstream event");
            }
            Err(e) => warn!(error = %e, "failed to serialize downstream event"),
        }
    }
}

/// The bound IPC server.
///
/// Owns the PID lock and the socket file; both are released when the
/// server finishes running (or is dropped on an error path).
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    _pid_lock: PidLock,
    events_tx: mpsc::Sender<Envelope>,
    downstream: broadcast::Sender<String>,
    shutdown: CancellationToken,
}

impl IpcServer {
    /// Bind the server.
    ///
    /// In order: ensure the socket's directory exists with mode 0700,
    /// acquire the PID lock, probe and clear a stale socket file, bind,
    /// and restrict the socket file to mode 0600.
    ///
    /// # Errors
    ///
    /// [`IpcError::AlreadyRunning`] when the PID lock is held,
    /// [`IpcError::SocketInUse`] when a live listener owns the socket path,
    /// [`IpcError::Io`] for everything filesystem-shaped.
    pub async fn bind(
        socket_path: &Path,
        pid_path: &Path,
        events_tx: mpsc::Sender<Envelope>,
        shutdown: CancellationToken,
    ) -> IpcResult<Self> {
        if let Some(dir) = socket_path.parent() {
            fs::create_dir_all(dir)?;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }

        let pid_lock = PidLock::acquire(pid_path)?;

        if socket_path.exists() {
            match tokio::time::timeout(PROBE_TIMEOUT, UnixStream::connect(socket_path)).await {
                Ok(Ok(_stream)) => {
                    return Err(IpcError::SocketInUse(socket_path.to_path_buf()));
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "socket file is stale; removing");
                    fs::remove_file(socket_path)?;
                }
                Err(_elapsed) => {
                    debug!("socket probe timed out; removing stale file");
                    fs::remove_file(socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(socket_path)?;
        fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
        info!(path = %socket_path.display(), "listening for hook events");

        let (downstream, _) = broadcast::channel(DOWNSTREAM_CAPACITY);
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            _pid_lock: pid_lock,
            events_tx,
            downstream,
            shutdown,
        })
    }

    /// Handle for sending downstream events to connected clients.
    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            tx: self.downstream.clone(),
        }
    }

    /// Accept connections until the shutdown token fires, then unlink the
    /// socket and release the PID lock.
    pub async fn run(self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let tx = self.events_tx.clone();
                        let rx = self.downstream.subscribe();
                        let token = self.shutdown.child_token();
                        tokio::spawn(handle_client(stream, tx, rx, token));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept ipc connection");
                    }
                },
            }
        }
        if let Err(e) = fs::remove_file(&self.socket_path) {
            warn!(error = %e, path = %self.socket_path.display(), "failed to unlink socket");
        }
        info!("ipc server stopped");
        // PID lock released by drop.
    }
}

/// One connection: an independent framed reader plus a forwarder for
/// downstream broadcasts. A slow or broken peer affects nobody else.
async fn handle_client(
    stream: UnixStream,
    events_tx: mpsc::Sender<Envelope>,
    mut downstream: broadcast::Receiver<String>,
    shutdown: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    let forward_shutdown = shutdown.clone();
    let forward = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = forward_shutdown.cancelled() => break,
                line = downstream.recv() => match line {
                    Ok(mut line) => {
                        line.push('\n');
                        if writer.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "client lagged on downstream events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    let mut framer = LineFramer::default();
    let mut buf = [0u8; READ_BUF];
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for line in framer.push(&buf[..n]) {
                        match Envelope::parse_line(&line) {
                            Ok(envelope) => {
                                if events_tx.send(envelope).await.is_err() {
                                    // Router gone; shutdown in progress.
                                    forward.abort();
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "skipping malformed event line");
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "ipc connection read error");
                    break;
                }
            },
        }
    }
    forward.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxgram_core::BridgeEvent;

    async fn bound(
        dir: &Path,
    ) -> (IpcServer, mpsc::Receiver<Envelope>, CancellationToken) {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);
        let server = IpcServer::bind(
            &dir.join("bridge.sock"),
            &dir.join("bridge.pid"),
            tx,
            token.clone(),
        )
        .await
        .unwrap();
        (server, rx, token)
    }

    #[tokio::test]
    async fn events_flow_from_client_to_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let (server, mut rx, token) = bound(tmp.path()).await;
        let socket = tmp.path().join("bridge.sock");
        let handle = tokio::spawn(server.run());

        let mut client = UnixStream::connect(&socket).await.unwrap();
        client
            .write_all(b"{\"type\":\"turn_complete\",\"sessionId\":\"s1\"}\n")
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.session_id.as_str(), "s1");
        assert_eq!(envelope.event, BridgeEvent::TurnComplete);

        token.cancel();
        handle.await.unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn malformed_line_is_skipped_and_connection_survives() {
        let tmp = tempfile::tempdir().unwrap();
        let (server, mut rx, token) = bound(tmp.path()).await;
        let socket = tmp.path().join("bridge.sock");
        let _handle = tokio::spawn(server.run());

        let mut client = UnixStream::connect(&socket).await.unwrap();
        client.write_all(b"this is not json\n").await.unwrap();
        client
            .write_all(b"{\"type\":\"session_end\",\"sessionId\":\"s2\"}\n")
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.session_id.as_str(), "s2");
        token.cancel();
    }

    #[tokio::test]
    async fn split_writes_frame_correctly() {
        let tmp = tempfile::tempdir().unwrap();
        let (server, mut rx, token) = bound(tmp.path()).await;
        let socket = tmp.path().join("bridge.sock");
        let _handle = tokio::spawn(server.run());

        let mut client = UnixStream::connect(&socket).await.unwrap();
        client
            .write_all(b"{\"type\":\"turn_com")
            .await
            .unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client
            .write_all(b"plete\",\"sessionId\":\"s3\"}\n")
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.session_id.as_str(), "s3");
        token.cancel();
    }

    #[tokio::test]
    async fn downstream_broadcast_reaches_client() {
        let tmp = tempfile::tempdir().unwrap();
        let (server, _rx, token) = bound(tmp.path()).await;
        let socket = tmp.path().join("bridge.sock");
        let broadcaster = server.broadcaster();
        let _handle = tokio::spawn(server.run());

        let mut client = UnixStream::connect(&socket).await.unwrap();
        // Give the connection task a moment to subscribe.
        tokio::time::sleep(Duration::from_millis(50)).await;

        broadcaster.send(&OutboundEvent::ApprovalResponse {
            session_id: "s1".into(),
            approval_id: "ap1".to_string(),
            approved: true,
            timestamp: chrono::Utc::now(),
        });

        let mut buf = vec![0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let line = String::from_utf8_lossy(&buf[..n]);
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["type"], "approval_response");
        assert_eq!(value["approved"], true);
        token.cancel();
    }

    #[tokio::test]
    async fn stale_socket_file_is_cleared_on_bind() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("bridge.sock");
        // A leftover socket file nobody listens on.
        drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
        assert!(socket.exists());

        let (server, _rx, token) = bound(tmp.path()).await;
        let _handle = tokio::spawn(server.run());
        assert!(UnixStream::connect(&socket).await.is_ok());
        token.cancel();
    }

    #[tokio::test]
    async fn live_listener_on_socket_path_rejects_bind() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("bridge.sock");
        let _live = UnixListener::bind(&socket).unwrap();

        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(4);
        // Separate pid path so the pid lock is not what fails.
        let result = IpcServer::bind(
            &socket,
            &tmp.path().join("other.pid"),
            tx,
            token,
        )
        .await;
        assert!(matches!(result, Err(IpcError::SocketInUse(_))));
    }

    #[tokio::test]
    async fn socket_file_mode_is_0600() {
        let tmp = tempfile::tempdir().unwrap();
        let (server, _rx, token) = bound(tmp.path()).await;
        let socket = tmp.path().join("bridge.sock");
        let mode = fs::metadata(&socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        drop(server);
        token.cancel();
    }
}
