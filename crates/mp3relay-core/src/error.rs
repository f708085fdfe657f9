//! Unified error type for the relay.
//!
//! Every failure is funneled into [`Error`], which carries enough context for
//! API handlers to derive an HTTP status code via [`Error::http_status`].

/// Unified error type covering all failure modes of the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied data was missing or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream conversion API failed, or its payload was unusable.
    #[error("{message}")]
    Upstream {
        /// HTTP status returned by the upstream, if a response was received.
        status: Option<u16>,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    ///
    /// Upstream failures always surface as 500, whatever the upstream itself
    /// answered; its status is kept only for logging.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::Config(_) => 500,
            Error::Upstream { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Config(_) => "config_error",
            Error::Upstream { .. } => "upstream_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
