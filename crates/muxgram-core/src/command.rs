//! Classification of inbound chat text into injection commands.

/// What an inbound chat message asks the daemon to do with the pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Send the Escape key (stop the current turn).
    Interrupt,
    /// Send Control-C (kill the foreground process).
    Kill,
    /// Forward the rest as a slash command typed into the CLI.
    Forward(String),
    /// Inject the text literally and submit it.
    Literal(String),
}

/// Words that map to the Escape key.
const INTERRUPT_WORDS: &[&str] = &["stop", "cancel", "abort", "esc", "escape"];

/// Words that map to Control-C.
const KILL_WORDS: &[&str] = &["kill", "exit", "quit", "ctrl+c", "ctrl-c", "^c"];

/// Classify one chat message.
///
/// Matching is case-insensitive and tolerates a single leading `/` (chat
/// clients autocomplete slash commands). Anything that is not a recognised
/// control word or a `cc ` forward is injected literally, preserving the
/// original casing and inner whitespace.
#[must_use]
pub fn classify(text: &str) -> ChatCommand {
    let trimmed = text.trim();
    let bare = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let lowered = bare.to_lowercase();

    if INTERRUPT_WORDS.contains(&lowered.as_str()) {
        return ChatCommand::Interrupt;
    }
    if KILL_WORDS.contains(&lowered.as_str()) {
        return ChatCommand::Kill;
    }
    if bare.is_char_boundary(3) && bare.len() >= 3 {
        let (head, rest) = bare.split_at(3);
        // The forwarded command is taken from the unlowered form; it is
        // typed into the CLI verbatim.
        if head.eq_ignore_ascii_case("cc ") && !rest.trim().is_empty() {
            return ChatCommand::Forward(rest.trim().to_string());
        }
    }
    ChatCommand::Literal(trimmed.to_string())
}
