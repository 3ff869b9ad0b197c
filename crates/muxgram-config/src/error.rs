//! Configuration error types.

use thiserror::Error;

/// Errors produced while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    /// An environment variable holds an unparseable value.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidVar {
        /// The variable name.
        var: &'static str,
        /// The offending value.
        value: String,
    },

    /// No home directory and no `MUXGRAM_HOME` override.
    #[error("cannot determine home directory; set MUXGRAM_HOME")]
    NoHome,

    /// The socket path exceeds the platform limit and no fallback exists.
    #[error("socket path too long ({len} > {max} bytes): {path}")]
    SocketPathTooLong {
        /// Byte length of the rejected path.
        len: usize,
        /// Platform limit.
        max: usize,
        /// The rejected path.
        path: String,
    },

    /// Filesystem error while preparing the runtime directory.
    #[error("runtime directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type ConfigResult<T> = Result<T, ConfigError>;
