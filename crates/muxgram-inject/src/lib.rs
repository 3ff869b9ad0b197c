//! Injection of chat replies into the terminal pane hosting the CLI.
//!
//! All multiplexer work goes through the [`Multiplexer`] trait; the real
//! implementation shells out to the `tmux` binary with argv arrays: no
//! shell, no quoting, and the `-S <socket>` flag on every invocation for
//! which a control socket is known. User text is always delivered with
//! `-l` (literal mode) so it can never be interpreted as key chords.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod tmux;

pub use error::{InjectError, InjectResult};
pub use tmux::{ControlKey, Multiplexer, PaneAddress, TmuxMultiplexer};
