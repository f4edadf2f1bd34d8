//! Error types for the persisted cache

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, mutating or committing a cache.
///
/// Errors are `Clone` so that the outcome of an asynchronous commit can be
/// delivered both to a callback on the owner context and to an awaiting
/// [`CommitHandle`](crate::cache::CommitHandle).
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Commit requested although nothing changed since the last load or commit
    #[error("The cache '{cache}' has not been modified since it was loaded or last committed")]
    InvalidState { cache: String },

    /// Buffer accessed before `load`
    #[error("The cache '{cache}' has not been loaded")]
    NotLoaded { cache: String },

    /// I/O error
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Item could not be serialized
    #[error("Failed to encode cache record: {0}")]
    Encode(String),

    /// Record could not be deserialized
    #[error("Failed to decode cache record: {0}")]
    Decode(String),

    /// Settings store failure
    #[error("Settings error: {0}")]
    Settings(String),

    /// Limiter policy string could not be parsed
    #[error("Invalid limiter policy '{policy}': {reason}")]
    InvalidLimiter { policy: String, reason: String },

    /// Cache name is not usable as a file name
    #[error("Invalid cache name '{0}'")]
    InvalidName(String),

    /// A cache with this name is already open in the context
    #[error("A cache named '{0}' is already open")]
    DuplicateName(String),

    /// Expiration arithmetic left the representable range
    #[error("Expiration overflows the timestamp range: {0}")]
    ExpirationOverflow(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background commit ended without reporting an outcome
    #[error("Commit of cache '{cache}' was aborted: {reason}")]
    CommitAborted { cache: String, reason: String },
}

impl Error {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true for failures that touched the backing storage.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::io("accessing cache storage", source)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::io("streaming cache records", std::io::Error::other(err.to_string()))
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Decode(err.to_string())
        } else {
            Error::Encode(err.to_string())
        }
    }
}
