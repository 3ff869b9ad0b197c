//! Telegram chat adapter for the muxgram bridge daemon.
//!
//! The router talks to chat through the [`ChatAdapter`] trait: send a
//! message (optionally into a forum thread), send with inline buttons,
//! create or close a forum topic. The real implementation wraps a
//! `teloxide` bot; a long-poll listener forwards inbound text messages and
//! button presses into the router's channel.
//!
//! One long-poll consumer per bot identity is a platform constraint;
//! message *sends* are safe to issue concurrently.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapter;
pub mod error;
pub mod format;
mod listener;
mod outbound;

pub use adapter::{Button, ChatAdapter, ChatUpdate};
pub use error::{ChatError, ChatResult};
pub use listener::{ListenerHandle, TelegramListener};
pub use outbound::TelegramChat;
