//! The `Multiplexer` trait and its tmux implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use muxgram_core::PaneTarget;

use crate::error::{InjectError, InjectResult};

/// Where to deliver keys: a pane plus the server socket that owns it.
///
/// The socket travels with the target because tmux resolves `-t` against
/// whichever server it talks to; omitting `-S` sends keys to the user's
/// *default* server, which may be a different one entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneAddress {
    /// The pane, `session:window.pane`.
    pub target: PaneTarget,
    /// Control socket of the owning server; `None` uses the default server.
    pub socket: Option<PathBuf>,
}

impl PaneAddress {
    /// Address a pane on a specific server.
    #[must_use]
    pub fn new(target: PaneTarget, socket: Option<PathBuf>) -> Self {
        Self { target, socket }
    }
}

/// Named keys the daemon can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    /// Submit the current input.
    Enter,
    /// Interrupt the current turn.
    Escape,
    /// Completion / focus movement.
    Tab,
    /// Kill the foreground process.
    CtrlC,
    /// Clear the input line.
    CtrlU,
}

impl ControlKey {
    /// The key name tmux understands.
    #[must_use]
    pub fn tmux_name(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Escape => "Escape",
            Self::Tab => "Tab",
            Self::CtrlC => "C-c",
            Self::CtrlU => "C-u",
        }
    }
}

/// Key-delivery seam between the router and the multiplexer binary.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Check that the addressed pane still exists.
    async fn validate(&self, addr: &PaneAddress) -> InjectResult<()>;

    /// Deliver user text literally, then submit it.
    async fn inject_text(&self, addr: &PaneAddress, text: &str) -> InjectResult<()>;

    /// Deliver one named key.
    async fn send_key(&self, addr: &PaneAddress, key: ControlKey) -> InjectResult<()>;

    /// Type a slash command (leading `/` added if absent), then submit it.
    async fn send_slash_command(&self, addr: &PaneAddress, command: &str) -> InjectResult<()>;

    /// Best-effort discovery of a pane hosting the CLI on the default
    /// server. The authoritative target always comes from event metadata;
    /// this exists for environments where that metadata is absent.
    async fn discover(&self) -> InjectResult<Option<PaneTarget>>;
}

/// Commands whose presence in a pane marks it as hosting the CLI.
const KNOWN_CLI_COMMANDS: &[&str] = &["claude", "node"];

/// Format used by the discovery listing.
const DISCOVER_FORMAT: &str =
    "#{session_name}:#{window_index}.#{pane_index} #{pane_current_command}";

/// The real tmux-backed implementation.
#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    bin: PathBuf,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxMultiplexer {
    /// Use `tmux` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary("tmux")
    }

    /// Use an explicit binary (tests, unusual installs).
    #[must_use]
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[String]) -> InjectResult<std::process::Output> {
        trace!(command = %display_command(&self.bin, args), "invoking multiplexer");
        let output = tokio::process::Command::new(&self.bin)
            .args(args)
            .output()
            .await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(InjectError::CommandFailed {
                command: display_command(&self.bin, args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn validate(&self, addr: &PaneAddress) -> InjectResult<()> {
        match self.run(&validate_args(addr)).await {
            Ok(_) => Ok(()),
            Err(InjectError::CommandFailed { .. }) => Err(InjectError::PaneNotFound {
                target: addr.target.to_string(),
            }),
            Err(other) => Err(other),
        }
    }

    async fn inject_text(&self, addr: &PaneAddress, text: &str) -> InjectResult<()> {
        self.validate(addr).await?;
        self.run(&literal_args(addr, text)).await?;
        self.run(&key_args(addr, ControlKey::Enter)).await?;
        debug!(target = %addr.target, bytes = text.len(), "injected text");
        Ok(())
    }

    async fn send_key(&self, addr: &PaneAddress, key: ControlKey) -> InjectResult<()> {
        self.run(&key_args(addr, key)).await?;
        debug!(target = %addr.target, key = key.tmux_name(), "sent key");
        Ok(())
    }

    async fn send_slash_command(&self, addr: &PaneAddress, command: &str) -> InjectResult<()> {
        self.validate(addr).await?;
        self.run(&slash_args(addr, command)).await?;
        self.run(&key_args(addr, ControlKey::Enter)).await?;
        debug!(target = %addr.target, command, "forwarded slash command");
        Ok(())
    }

    async fn discover(&self) -> InjectResult<Option<PaneTarget>> {
        let args: Vec<String> = vec![
            "list-panes".to_string(),
            "-a".to_string(),
            "-F".to_string(),
            DISCOVER_FORMAT.to_string(),
        ];
        match self.run(&args).await {
            Ok(output) => {
                let listing = String::from_utf8_lossy(&output.stdout);
                Ok(parse_pane_listing(&listing))
            }
            Err(e) => {
                // No server running is the normal case here.
                warn!(error = %e, "pane discovery failed");
                Ok(None)
            }
        }
    }
}

/// `-S <socket>` when the owning server is known, on every invocation.
fn base_args(addr: &PaneAddress) -> Vec<String> {
    match &addr.socket {
        Some(socket) => vec!["-S".to_string(), socket.display().to_string()],
        None => Vec::new(),
    }
}

fn validate_args(addr: &PaneAddress) -> Vec<String> {
    let mut args = base_args(addr);
    args.extend([
        "list-panes".to_string(),
        "-t".to_string(),
        addr.target.to_string(),
    ]);
    args
}

fn literal_args(addr: &PaneAddress, text: &str) -> Vec<String> {
    let mut args = base_args(addr);
    args.extend([
        "send-keys".to_string(),
        "-t".to_string(),
        addr.target.to_string(),
        "-l".to_string(),
        text.to_string(),
    ]);
    args
}

fn key_args(addr: &PaneAddress, key: ControlKey) -> Vec<String> {
    let mut args = base_args(addr);
    args.extend([
        "send-keys".to_string(),
        "-t".to_string(),
        addr.target.to_string(),
        key.tmux_name().to_string(),
    ]);
    args
}

/// Slash commands are sent *without* `-l`: the whole string fails tmux's
/// key-name lookup and is typed as-is, leading `/` included.
fn slash_args(addr: &PaneAddress, command: &str) -> Vec<String> {
    let slashed = if command.starts_with('/') {
        command.to_string()
    } else {
        format!("/{command}")
    };
    let mut args = base_args(addr);
    args.extend([
        "send-keys".to_string(),
        "-t".to_string(),
        addr.target.to_string(),
        slashed,
    ]);
    args
}

/// First pane whose current command looks like the CLI.
fn parse_pane_listing(listing: &str) -> Option<PaneTarget> {
    for line in listing.lines() {
        let Some((target, command)) = line.trim().rsplit_once(' ') else {
            continue;
        };
        if KNOWN_CLI_COMMANDS.contains(&command) {
            if let Ok(target) = target.parse::<PaneTarget>() {
                return Some(target);
            }
        }
    }
    None
}

/// Shell-style quoting for log lines only; execution never goes through a
/// shell. Escaping is limited to backslash and double quote.
fn display_command(bin: &std::path::Path, args: &[String]) -> String {
    let mut out = bin.display().to_string();
    for arg in args {
        out.push(' ');
        if arg.contains(' ') || arg.contains('"') || arg.contains('\\') {
            out.push('"');
            for c in arg.chars() {
                if c == '\\' || c == '"' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_with_socket() -> PaneAddress {
        PaneAddress::new(
            "main:0.1".parse().unwrap(),
            Some(PathBuf::from("/tmp/tmux-1000/default")),
        )
    }

    fn addr_without_socket() -> PaneAddress {
        PaneAddress::new("main:0.1".parse().unwrap(), None)
    }

    // --- argv construction ---

    #[test]
    fn socket_flag_is_always_first_when_known() {
        let addr = addr_with_socket();
        for args in [
            validate_args(&addr),
            literal_args(&addr, "hi"),
            key_args(&addr, ControlKey::Enter),
            slash_args(&addr, "compact"),
        ] {
            assert_eq!(args[0], "-S");
            assert_eq!(args[1], "/tmp/tmux-1000/default");
        }
    }

    #[test]
    fn no_socket_flag_without_a_socket() {
        let args = literal_args(&addr_without_socket(), "hi");
        assert!(!args.contains(&"-S".to_string()));
        assert_eq!(args[0], "send-keys");
    }

    #[test]
    fn literal_send_uses_the_literal_flag() {
        let args = literal_args(&addr_without_socket(), "rm -rf Enter");
        let l_pos = args.iter().position(|a| a == "-l").unwrap();
        // The user text is the argument right after -l, untouched.
        assert_eq!(args[l_pos + 1], "rm -rf Enter");
    }

    #[test]
    fn validate_lists_the_target_pane() {
        let args = validate_args(&addr_without_socket());
        assert_eq!(args, vec!["list-panes", "-t", "main:0.1"]);
    }

    #[test]
    fn key_names_map_to_tmux_spellings() {
        assert_eq!(ControlKey::Enter.tmux_name(), "Enter");
        assert_eq!(ControlKey::Escape.tmux_name(), "Escape");
        assert_eq!(ControlKey::Tab.tmux_name(), "Tab");
        assert_eq!(ControlKey::CtrlC.tmux_name(), "C-c");
        assert_eq!(ControlKey::CtrlU.tmux_name(), "C-u");
    }

    #[test]
    fn slash_command_gains_a_leading_slash() {
        let args = slash_args(&addr_without_socket(), "compact");
        assert_eq!(args.last().unwrap(), "/compact");
    }

    #[test]
    fn slash_command_keeps_an_existing_slash() {
        let args = slash_args(&addr_without_socket(), "/resume now");
        assert_eq!(args.last().unwrap(), "/resume now");
    }

    #[test]
    fn slash_send_is_not_literal() {
        let args = slash_args(&addr_without_socket(), "compact");
        assert!(!args.contains(&"-l".to_string()));
    }

    // --- discovery parsing ---

    #[test]
    fn discovery_finds_the_cli_pane() {
        let listing = "main:0.0 zsh\nmain:0.1 claude\nother:1.0 vim\n";
        assert_eq!(
            parse_pane_listing(listing),
            Some("main:0.1".parse().unwrap())
        );
    }

    #[test]
    fn discovery_matches_node_hosts() {
        let listing = "w:2.3 node\n";
        assert_eq!(parse_pane_listing(listing), Some("w:2.3".parse().unwrap()));
    }

    #[test]
    fn discovery_ignores_unrelated_panes() {
        let listing = "main:0.0 zsh\nmain:0.1 vim\n";
        assert_eq!(parse_pane_listing(listing), None);
    }

    #[test]
    fn discovery_tolerates_malformed_lines() {
        let listing = "garbage\n\nmain:0.1 claude\n";
        assert_eq!(
            parse_pane_listing(listing),
            Some("main:0.1".parse().unwrap())
        );
    }

    // --- display quoting ---

    #[test]
    fn display_quotes_only_what_needs_it() {
        let out = display_command(
            std::path::Path::new("tmux"),
            &["send-keys".to_string(), "hello world".to_string()],
        );
        assert_eq!(out, "tmux send-keys \"hello world\"");
    }

    #[test]
    fn display_escapes_backslash_and_quote() {
        let out = display_command(
            std::path::Path::new("tmux"),
            &["say \"hi\"\\now".to_string()],
        );
        assert_eq!(out, "tmux \"say \\\"hi\\\"\\\\now\"");
    }

    // --- subprocess behavior via stand-in binaries ---

    #[tokio::test]
    async fn successful_exit_is_ok() {
        let mux = TmuxMultiplexer::with_binary("true");
        assert!(mux.run(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_command_failed() {
        let mux = TmuxMultiplexer::with_binary("false");
        assert!(matches!(
            mux.run(&[]).await,
            Err(InjectError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_spawn_error() {
        let mux = TmuxMultiplexer::with_binary("/nonexistent/definitely-not-tmux");
        assert!(matches!(mux.run(&[]).await, Err(InjectError::Spawn(_))));
    }

    #[tokio::test]
    async fn validate_maps_failure_to_pane_not_found() {
        let mux = TmuxMultiplexer::with_binary("false");
        let err = mux.validate(&addr_without_socket()).await.unwrap_err();
        assert!(matches!(err, InjectError::PaneNotFound { .. }));
    }
}
