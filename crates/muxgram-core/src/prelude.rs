//! Convenience re-exports for downstream crates.
//!
//! ```rust
//! use muxgram_core::prelude::*;
//!
//! let envelope = Envelope::parse_line(
//!     r#"{"type":"turn_complete","sessionId":"abc"}"#,
//! ).unwrap();
//! assert_eq!(envelope.event.kind(), "turn_complete");
//! ```

pub use crate::approval::{ApprovalDecision, ApprovalId, ApprovalRecord, ApprovalStatus};
pub use crate::callback::CallbackData;
pub use crate::command::{classify, ChatCommand};
pub use crate::event::{BridgeEvent, Envelope, EventMeta, InputSource, OutboundEvent};
pub use crate::session::{SessionId, SessionRecord, SessionStatus};
pub use crate::target::PaneTarget;
