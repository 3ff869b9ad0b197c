//! Configuration for the muxgram bridge daemon.
//!
//! Everything is read from environment variables; the daemon runs under a
//! service manager, not from a config file. Two variables are required
//! (`MUXGRAM_BOT_TOKEN`, `MUXGRAM_CHAT_ID`); the rest have defaults. See
//! [`BridgeConfig::from_env`].
//!
//! The crate also owns the on-disk layout: a user-private runtime directory
//! (mode 0700) holding the Unix socket, PID file, session store and optional
//! debug log.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod paths;

pub use error::{ConfigError, ConfigResult};
pub use paths::{unix_socket_path_max, RuntimePaths};

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

/// Default reaper threshold, in hours.
const DEFAULT_STALE_TIMEOUT_HOURS: u64 = 72;
/// Default bound on waiting for a forum thread to exist, in seconds.
const DEFAULT_THREAD_WAIT_SECS: u64 = 5;
/// Default self-echo suppression window, in seconds.
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 10;
/// Default approval lifetime, in seconds.
const DEFAULT_APPROVAL_TTL_SECS: u64 = 300;

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Telegram bot token.
    pub bot_token: String,
    /// The forum chat this daemon serves.
    pub chat_id: i64,
    /// Create one forum topic per session (off: everything goes to the
    /// chat's general area and inbound routing is disabled).
    pub use_threads: bool,
    /// Render tool start/result events (off: only responses and errors).
    pub verbose: bool,
    /// Enable the approval button flow.
    pub approvals_enabled: bool,
    /// Sessions idle longer than this are candidates for reaping.
    pub stale_timeout: Duration,
    /// Bound on waiting for topic creation before dropping a message.
    pub thread_wait: Duration,
    /// Self-echo suppression window after an injection.
    pub dedup_window: Duration,
    /// Approval expiry.
    pub approval_ttl: Duration,
    /// Telegram user ids allowed to drive sessions; empty allows everyone.
    pub allowed_user_ids: Vec<u64>,
    /// Also write a debug log file in the runtime directory.
    pub debug_log: bool,
    /// On-disk layout (socket, PID file, store, log).
    pub paths: RuntimePaths,
}

impl BridgeConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for an absent required variable,
    /// [`ConfigError::InvalidVar`] for unparseable values, and
    /// [`ConfigError::NoHome`] when the home directory cannot be resolved
    /// and no `MUXGRAM_HOME` override is set.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup (exposed for tests).
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let bot_token = lookup("MUXGRAM_BOT_TOKEN")
            .or_else(|| lookup("TELEGRAM_BOT_TOKEN"))
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar("MUXGRAM_BOT_TOKEN"))?;

        let chat_id = required_parsed::<i64>(&lookup, "MUXGRAM_CHAT_ID")?;

        let use_threads = optional_bool(&lookup, "MUXGRAM_USE_THREADS")?.unwrap_or(true);
        let verbose = optional_bool(&lookup, "MUXGRAM_VERBOSE")?.unwrap_or(true);
        let approvals_enabled = optional_bool(&lookup, "MUXGRAM_APPROVALS")?.unwrap_or(true);
        let debug_log = optional_bool(&lookup, "MUXGRAM_DEBUG_LOG")?.unwrap_or(false);

        let stale_hours = optional_parsed::<u64>(&lookup, "MUXGRAM_STALE_TIMEOUT_HOURS")?
            .unwrap_or(DEFAULT_STALE_TIMEOUT_HOURS);
        let thread_wait_secs = optional_parsed::<u64>(&lookup, "MUXGRAM_THREAD_WAIT_SECS")?
            .unwrap_or(DEFAULT_THREAD_WAIT_SECS);
        let dedup_secs = optional_parsed::<u64>(&lookup, "MUXGRAM_DEDUP_WINDOW_SECS")?
            .unwrap_or(DEFAULT_DEDUP_WINDOW_SECS);
        let approval_secs = optional_parsed::<u64>(&lookup, "MUXGRAM_APPROVAL_TTL_SECS")?
            .unwrap_or(DEFAULT_APPROVAL_TTL_SECS);

        let allowed_user_ids = parse_user_list(&lookup, "MUXGRAM_ALLOWED_USERS")?;

        let home_override = lookup("MUXGRAM_HOME").map(PathBuf::from);
        let socket_override = lookup("MUXGRAM_SOCKET_PATH").map(PathBuf::from);
        let paths = RuntimePaths::resolve(home_override, socket_override)?;

        let config = Self {
            bot_token,
            chat_id,
            use_threads,
            verbose,
            approvals_enabled,
            stale_timeout: Duration::from_secs(stale_hours.saturating_mul(3600)),
            thread_wait: Duration::from_secs(thread_wait_secs),
            dedup_window: Duration::from_secs(dedup_secs),
            approval_ttl: Duration::from_secs(approval_secs),
            allowed_user_ids,
            debug_log,
            paths,
        };
        info!(
            chat_id = config.chat_id,
            use_threads = config.use_threads,
            verbose = config.verbose,
            approvals = config.approvals_enabled,
            socket = %config.paths.socket.display(),
            "configuration resolved"
        );
        Ok(config)
    }

    /// Whether a Telegram user may drive sessions through this daemon.
    ///
    /// An empty allowlist allows everyone.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}

fn required_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<T> {
    let raw = lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(key))?;
    raw.parse().map_err(|_| ConfigError::InvalidVar {
        var: key,
        value: raw,
    })
}

fn optional_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<Option<T>> {
    match lookup(key).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar {
                var: key,
                value: raw,
            }),
    }
}

fn optional_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<Option<bool>> {
    match lookup(key).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidVar {
                var: key,
                value: raw,
            }),
        },
    }
}

fn parse_user_list(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<Vec<u64>> {
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|_| ConfigError::InvalidVar {
                var: key,
                value: raw.clone(),
            })
        })
        .collect()
}
