//! Inline-button callback payload codec.
//!
//! Telegram limits `callback_data` to 64 bytes, so payloads are a short
//! prefix plus ids: `apr:<approval-id>:<code>` for approval buttons and
//! `det:<cache-key>` for tool-input "Details" buttons. Approval ids and
//! cache keys are UUIDs (36 chars), which fits either form.

use crate::approval::{decision_from_code, ApprovalDecision, ApprovalId};

/// A decoded inline-button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    /// One of the three approval buttons.
    Approval {
        /// Which approval row the button belongs to.
        id: ApprovalId,
        /// The pressed option.
        decision: ApprovalDecision,
    },
    /// A "Details" button referencing a cached tool input.
    Details {
        /// Key into the tool-input cache.
        key: String,
    },
}

impl CallbackData {
    /// Encode an approval button payload.
    #[must_use]
    pub fn approval(id: &ApprovalId, decision: ApprovalDecision) -> String {
        format!("apr:{}:{}", id.as_str(), decision.code())
    }

    /// Encode a details button payload.
    #[must_use]
    pub fn details(key: &str) -> String {
        format!("det:{key}")
    }

    /// Decode a payload; `None` for anything this daemon did not produce.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(rest) = data.strip_prefix("apr:") {
            let (id, code) = rest.rsplit_once(':')?;
            if id.is_empty() {
                return None;
            }
            let decision = decision_from_code(code)?;
            return Some(Self::Approval {
                id: ApprovalId::new(id),
                decision,
            });
        }
        if let Some(key) = data.strip_prefix("det:") {
            if key.is_empty() {
                return None;
            }
            return Some(Self::Details {
                key: key.to_string(),
            });
        }
        None
    }
}
