//! Chat adapter error types.

use thiserror::Error;

/// Errors from the chat platform.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The Telegram API rejected or failed a request.
    #[error("telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),

    /// A thread id outside Telegram's 32-bit message-id space.
    #[error("thread id out of range: {0}")]
    ThreadIdOutOfRange(i64),

    /// A message id outside Telegram's 32-bit message-id space.
    #[error("message id out of range: {0}")]
    MessageIdOutOfRange(i64),
}

/// Result type for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
