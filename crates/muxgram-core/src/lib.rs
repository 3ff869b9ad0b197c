//! muxgram core: foundation types for the bridge daemon.
//!
//! This crate provides:
//! - The typed event taxonomy and NDJSON wire parsing
//! - Session and approval records shared by the store and the router
//! - Pane-target addressing for the terminal multiplexer
//! - Classification of inbound chat text into injection commands

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod approval;
pub mod callback;
pub mod command;
pub mod event;
pub mod prelude;
pub mod session;
pub mod target;

pub use approval::{ApprovalDecision, ApprovalId, ApprovalRecord, ApprovalStatus};
pub use callback::CallbackData;
pub use command::{classify, ChatCommand};
pub use event::{
    BridgeEvent, CompactTrigger, Envelope, EventMeta, EventParseError, InputSource, OutboundEvent,
};
pub use session::{SessionId, SessionRecord, SessionStatus};
pub use target::{PaneTarget, TargetParseError};
