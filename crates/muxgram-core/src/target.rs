//! Pane addressing for the terminal multiplexer.

use std::fmt;
use std::str::FromStr;

/// A fully qualified pane address: `session:window.pane`.
///
/// The session name is as tmux reports it (it cannot contain `:` or `.`);
/// window and pane are numeric indexes. A `PaneTarget` only addresses a pane
/// within one server; the server itself is identified separately by its
/// control socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaneTarget {
    session: String,
    window: u32,
    pane: u32,
}

impl PaneTarget {
    /// Assemble a target from its parts.
    #[must_use]
    pub fn new(session: impl Into<String>, window: u32, pane: u32) -> Self {
        Self {
            session: session.into(),
            window,
            pane,
        }
    }

    /// The multiplexer session name.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Window index within the session.
    #[must_use]
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Pane index within the window.
    #[must_use]
    pub fn pane(&self) -> u32 {
        self.pane
    }
}

impl fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.pane)
    }
}

/// Why a pane target string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetParseError {
    /// No `:` separating session from window.pane.
    #[error("pane target has no ':' separator: {0}")]
    MissingColon(String),
    /// The session name part is empty.
    #[error("pane target has an empty session name: {0}")]
    EmptySession(String),
    /// No `.` separating window from pane.
    #[error("pane target has no '.' separator: {0}")]
    MissingDot(String),
    /// Window or pane index is not a number.
    #[error("pane target has a non-numeric index: {0}")]
    BadIndex(String),
}

impl FromStr for PaneTarget {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (session, rest) = s
            .split_once(':')
            .ok_or_else(|| TargetParseError::MissingColon(s.to_string()))?;
        if session.is_empty() {
            return Err(TargetParseError::EmptySession(s.to_string()));
        }
        let (window, pane) = rest
            .split_once('.')
            .ok_or_else(|| TargetParseError::MissingDot(s.to_string()))?;
        let window: u32 = window
            .parse()
            .map_err(|_| TargetParseError::BadIndex(s.to_string()))?;
        let pane: u32 = pane
            .parse()
            .map_err(|_| TargetParseError::BadIndex(s.to_string()))?;
        Ok(Self::new(session, window, pane))
    }
}
