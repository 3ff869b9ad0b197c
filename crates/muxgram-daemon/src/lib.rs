//! The muxgram bridge daemon.
//!
//! Mirrors interactive terminal AI coding sessions into a Telegram forum
//! chat, one topic per session, and injects chat replies back into the
//! originating tmux pane. Hook events arrive over a Unix socket; the
//! router correlates them to durable sessions, materialises a topic per
//! session, renders events as messages, and routes replies to the right
//! pane.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod caches;
pub mod coordinator;
pub mod reaper;
pub mod render;
pub mod router;

pub use router::Router;
