//! The chat adapter trait and inbound update types.

use async_trait::async_trait;

use crate::error::ChatResult;

/// An inline button under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible label.
    pub label: String,
    /// Callback payload (≤ 64 bytes on Telegram).
    pub data: String,
}

impl Button {
    /// Build a button.
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Outbound chat capabilities the router depends on.
///
/// `thread_id` is `None` for the chat's general area; the router only ever
/// passes `None` for messages that must not land in a session thread.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Send an HTML message; returns the id of the (first) sent message.
    async fn send_html(&self, thread_id: Option<i64>, html: &str) -> ChatResult<i64>;

    /// Send an HTML message with one row of inline buttons per chunk of
    /// two; returns the id of the message carrying the buttons.
    async fn send_with_buttons(
        &self,
        thread_id: Option<i64>,
        html: &str,
        buttons: &[Button],
    ) -> ChatResult<i64>;

    /// Create a forum topic; returns its thread id.
    async fn create_forum_topic(&self, name: &str, color_index: usize) -> ChatResult<i64>;

    /// Rename a forum topic (annotations often arrive after the first
    /// event already forced creation under a bare title).
    async fn rename_forum_topic(&self, thread_id: i64, name: &str) -> ChatResult<()>;

    /// Close a forum topic.
    async fn close_forum_topic(&self, thread_id: i64) -> ChatResult<()>;

    /// Remove the inline keyboard from a previously sent message.
    async fn clear_buttons(&self, message_id: i64) -> ChatResult<()>;
}

/// Inbound updates forwarded from the long-poll listener to the router.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    /// A text message in the daemon's chat.
    Message {
        /// Thread it arrived in; `None` for the general area.
        thread_id: Option<i64>,
        /// The text.
        text: String,
        /// Sender, when Telegram reports one.
        user_id: Option<u64>,
    },
    /// An inline-button press (already acknowledged by the listener).
    Callback {
        /// The button's payload.
        data: String,
        /// Who pressed it.
        user_id: u64,
        /// The message carrying the button, when still accessible.
        message_id: Option<i64>,
        /// Thread of that message, when known.
        thread_id: Option<i64>,
    },
}
