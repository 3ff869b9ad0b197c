//! The hook event taxonomy and NDJSON wire format.
//!
//! Hooks emit one JSON object per line over the Unix socket:
//!
//! ```json
//! { "type": "tool_start", "sessionId": "abc", "timestamp": "2025-06-01T12:00:00Z",
//!   "content": "Bash", "metadata": { "tool": "Bash", "input": { "command": "ls" } } }
//! ```
//!
//! Parsing produces an [`Envelope`]: the session id, timestamp and shared
//! metadata plus a [`BridgeEvent`], a tagged variant per event type, with
//! the metadata fields each type actually uses lifted into the variant.
//! Unrecognised types become [`BridgeEvent::Unknown`] so the router can log
//! and drop them without breaking the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionId;

/// Shared metadata carried by events, camelCase on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMeta {
    /// Host running the CLI; display only.
    pub hostname: Option<String>,
    /// Project directory of the CLI; display only.
    pub project_dir: Option<String>,
    /// Pane currently hosting the CLI (`session:window.pane`).
    pub tmux_target: Option<String>,
    /// Control socket of the multiplexer server owning the pane.
    pub tmux_socket: Option<String>,
    /// Tool name for `tool_start` / `tool_result`.
    pub tool: Option<String>,
    /// Structured tool arguments, cached for the Details button.
    pub input: Option<Value>,
    /// For `pre_compact`: `auto` or `manual`.
    pub trigger: Option<String>,
    /// Severity hint for `error` events.
    pub level: Option<String>,
    /// For `user_input`: where the text originated.
    pub source: Option<String>,
}

/// Where a `user_input` event's text originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// Typed directly in the terminal.
    Cli,
    /// Injected by this daemon from a chat reply.
    Telegram,
}

impl InputSource {
    fn from_meta(meta: &EventMeta) -> Self {
        match meta.source.as_deref() {
            Some("telegram") => Self::Telegram,
            _ => Self::Cli,
        }
    }
}

/// What triggered a context compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactTrigger {
    /// The CLI decided on its own.
    #[default]
    Auto,
    /// The user asked for it.
    Manual,
}

impl CompactTrigger {
    fn from_meta(meta: &EventMeta) -> Self {
        match meta.trigger.as_deref() {
            Some("manual") => Self::Manual,
            _ => Self::Auto,
        }
    }
}

/// One hook event, with per-type payload fields.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Informational; current hooks no longer emit it, but it is accepted.
    SessionStart,
    /// The CLI session ended.
    SessionEnd,
    /// A completed assistant response (markdown).
    AgentResponse {
        /// The response text.
        text: String,
    },
    /// A tool invocation is starting.
    ToolStart {
        /// Tool name.
        tool: String,
        /// Structured tool arguments, if reported.
        input: Option<Value>,
    },
    /// A tool invocation finished.
    ToolResult {
        /// Tool name, if reported.
        tool: Option<String>,
        /// Tool output (possibly containing terminal control sequences).
        output: String,
    },
    /// The user typed a prompt in the CLI.
    UserInput {
        /// The prompt text.
        text: String,
        /// Origin, used for self-echo suppression.
        source: InputSource,
    },
    /// A hook is blocked waiting for a permission decision.
    ApprovalRequest {
        /// Verbatim prompt to show the user.
        prompt: String,
    },
    /// Downstream-only in practice; accepted and ignored inbound.
    ApprovalResponse,
    /// The CLI reported an error.
    Error {
        /// Error text.
        message: String,
        /// Severity hint.
        level: Option<String>,
    },
    /// The assistant finished a turn.
    TurnComplete,
    /// Context compaction is about to run.
    PreCompact {
        /// What triggered it.
        trigger: CompactTrigger,
    },
    /// The user ran a CLI slash command.
    Command {
        /// The command name, without arguments.
        name: String,
    },
    /// An event type this daemon does not know; logged and dropped.
    Unknown {
        /// The wire `type` value.
        name: String,
        /// The raw line, for diagnostics.
        raw: String,
    },
}

impl BridgeEvent {
    /// Stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::AgentResponse { .. } => "agent_response",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolResult { .. } => "tool_result",
            Self::UserInput { .. } => "user_input",
            Self::ApprovalRequest { .. } => "approval_request",
            Self::ApprovalResponse => "approval_response",
            Self::Error { .. } => "error",
            Self::TurnComplete => "turn_complete",
            Self::PreCompact { .. } => "pre_compact",
            Self::Command { .. } => "command",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// A parsed wire event: addressing plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The session the event belongs to.
    pub session_id: SessionId,
    /// Hook-reported time; the arrival time if absent.
    pub timestamp: DateTime<Utc>,
    /// Shared metadata (annotations, pane addressing).
    pub meta: EventMeta,
    /// The typed payload.
    pub event: BridgeEvent,
}

/// Why a wire line could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    /// The line is not a JSON object of the expected shape.
    #[error("malformed event line: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    session_id: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: EventMeta,
}

impl Envelope {
    /// Parse one newline-framed wire line (without its terminator).
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Json`] if the line is not a JSON object
    /// carrying at least `type` and `sessionId`. An unrecognised `type` is
    /// not an error; it parses to [`BridgeEvent::Unknown`].
    pub fn parse_line(line: &str) -> Result<Self, EventParseError> {
        let wire: WireEvent = serde_json::from_str(line)?;
        let event = match wire.kind.as_str() {
            "session_start" => BridgeEvent::SessionStart,
            "session_end" => BridgeEvent::SessionEnd,
            "agent_response" => BridgeEvent::AgentResponse { text: wire.content },
            "tool_start" => BridgeEvent::ToolStart {
                tool: wire
                    .metadata
                    .tool
                    .clone()
                    .unwrap_or_else(|| wire.content.clone()),
                input: wire.metadata.input.clone(),
            },
            "tool_result" => BridgeEvent::ToolResult {
                tool: wire.metadata.tool.clone(),
                output: wire.content,
            },
            "user_input" => BridgeEvent::UserInput {
                text: wire.content,
                source: InputSource::from_meta(&wire.metadata),
            },
            "approval_request" => BridgeEvent::ApprovalRequest {
                prompt: wire.content,
            },
            "approval_response" => BridgeEvent::ApprovalResponse,
            "error" => BridgeEvent::Error {
                message: wire.content,
                level: wire.metadata.level.clone(),
            },
            "turn_complete" => BridgeEvent::TurnComplete,
            "pre_compact" => BridgeEvent::PreCompact {
                trigger: CompactTrigger::from_meta(&wire.metadata),
            },
            "command" => BridgeEvent::Command { name: wire.content },
            other => BridgeEvent::Unknown {
                name: other.to_string(),
                raw: line.to_string(),
            },
        };
        Ok(Self {
            session_id: SessionId::from(wire.session_id),
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            meta: wire.metadata,
            event,
        })
    }
}

/// Events the daemon broadcasts to connected hook clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// The decision for a pending approval.
    ApprovalResponse {
        /// The session whose hook is waiting.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// The approval row this answers.
        #[serde(rename = "approvalId")]
        approval_id: String,
        /// Whether the tool call may proceed.
        approved: bool,
        /// When the decision was made.
        timestamp: DateTime<Utc>,
    },
}

impl OutboundEvent {
    /// Serialize to one wire line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error; with these types that
    /// only happens on allocation failure.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
