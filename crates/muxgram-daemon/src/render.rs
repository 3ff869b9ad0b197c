//! Event-to-chat rendering.
//!
//! Pure text shaping: terminal control sequences are stripped, oversized
//! tool payloads truncated, code fenced, and common tool verbs reduced to
//! a one-line preview. Nothing here talks to the network.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use muxgram_core::CompactTrigger;
use muxgram_telegram::format::{code_block, html_escape, inline_code, markdown_to_html};

/// Longest tool output shown before truncation.
pub const TOOL_OUTPUT_LIMIT: usize = 3000;

/// Longest tool-argument preview on a `tool_start` line.
pub const TOOL_PREVIEW_LIMIT: usize = 160;

/// Longest "Details" dump; above this even the full view is truncated.
pub const DETAILS_LIMIT: usize = 3500;

/// Remove ANSI escape sequences (CSI, OSC, and two-byte escapes).
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    static ANSI: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
            .expect("invalid regex")
    });
    ANSI.replace_all(text, "").into_owned()
}

/// Truncate on a char boundary, appending a marker when anything was cut.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}… [truncated]", &text[..cut]),
    }
}

/// One-line preview of a tool invocation.
///
/// Knows the common verbs; anything else falls back to the first string
/// field of the input, or nothing.
#[must_use]
pub fn tool_preview(tool: &str, input: Option<&Value>) -> String {
    let detail = input.and_then(|input| preview_field(tool, input));
    match detail {
        Some(detail) => format!("{tool}: {}", truncate(&detail, TOOL_PREVIEW_LIMIT)),
        None => tool.to_string(),
    }
}

fn preview_field(tool: &str, input: &Value) -> Option<String> {
    let key = match tool {
        "Read" | "Write" | "Edit" => "file_path",
        "Bash" => "command",
        "Grep" | "Glob" => "pattern",
        "WebFetch" => "url",
        "Task" => "description",
        _ => "",
    };
    if !key.is_empty() {
        if let Some(value) = input.get(key).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    // Fallback: the first string field, in object order.
    input
        .as_object()?
        .values()
        .find_map(|v| v.as_str())
        .map(ToString::to_string)
}

// --- outbound message bodies (Telegram HTML) ---

/// An assistant response, markdown converted.
#[must_use]
pub fn agent_response(text: &str) -> String {
    markdown_to_html(&strip_ansi(text))
}

/// A `tool_start` line.
#[must_use]
pub fn tool_start(tool: &str, input: Option<&Value>) -> String {
    format!("🔧 {}", html_escape(&tool_preview(tool, input)))
}

/// A `tool_result` body with fenced, truncated output.
#[must_use]
pub fn tool_result(tool: Option<&str>, output: &str) -> String {
    let clean = strip_ansi(output);
    let trimmed = clean.trim();
    let label = tool.unwrap_or("tool");
    if trimmed.is_empty() {
        format!("✅ {} finished", html_escape(label))
    } else {
        format!(
            "✅ {}\n{}",
            html_escape(label),
            code_block(&truncate(trimmed, TOOL_OUTPUT_LIMIT))
        )
    }
}

/// A prompt the user typed in the terminal.
#[must_use]
pub fn user_input(text: &str) -> String {
    format!("👤 {}", html_escape(&strip_ansi(text)))
}

/// An error event; the level hint prefixes the text when present.
#[must_use]
pub fn error(message: &str, level: Option<&str>) -> String {
    match level {
        Some(level) => format!(
            "⚠️ <b>{}</b>: {}",
            html_escape(level),
            html_escape(&strip_ansi(message))
        ),
        None => format!("⚠️ {}", html_escape(&strip_ansi(message))),
    }
}

/// A CLI slash command the user ran in the terminal.
#[must_use]
pub fn command(name: &str) -> String {
    format!("▶️ {}", inline_code(&format!("/{}", name.trim_start_matches('/'))))
}

/// Compaction about to run.
#[must_use]
pub fn pre_compact(trigger: CompactTrigger) -> String {
    let how = match trigger {
        CompactTrigger::Auto => "automatic",
        CompactTrigger::Manual => "manual",
    };
    format!("♻️ Context compaction ({how}) starting…")
}

/// Compaction finished (flag cleared by `turn_complete`).
#[must_use]
pub fn compaction_done() -> String {
    "♻️ Context compaction complete".to_string()
}

/// Farewell for an explicit `session_end`.
#[must_use]
pub fn session_farewell() -> String {
    "👋 Session ended".to_string()
}

/// Farewell when the reaper closes an abandoned session.
#[must_use]
pub fn reaped_farewell() -> String {
    "👋 Session ended (terminal closed)".to_string()
}

/// Farewell when the administrator aborts via the approval buttons.
#[must_use]
pub fn aborted_farewell() -> String {
    "🛑 Session aborted".to_string()
}

/// The approval prompt with its verbatim request text.
#[must_use]
pub fn approval_prompt(prompt: &str) -> String {
    format!(
        "<b>Approval required</b>\n{}",
        code_block(&strip_ansi(prompt))
    )
}

/// Outcome line posted after an approval button press.
#[must_use]
pub fn approval_outcome(label: &str) -> String {
    format!("Decision: <b>{}</b>", html_escape(label))
}

/// Full tool-input dump behind a Details button.
#[must_use]
pub fn details_dump(pretty_input: &str) -> String {
    code_block(&truncate(pretty_input, DETAILS_LIMIT))
}

/// User-visible injection failure with recovery advice.
#[must_use]
pub fn injection_failure(hint: &str) -> String {
    format!("❌ Could not send input; {}", html_escape(hint))
}

/// User-visible key-delivery failure.
#[must_use]
pub fn key_failure(key_name: &str, hint: &str) -> String {
    format!(
        "❌ Could not deliver {}; {}",
        html_escape(key_name),
        html_escape(hint)
    )
}
