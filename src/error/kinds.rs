use std::time::Duration;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`CursorError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, CursorError>;

/// Top-level error type for cursor operations.
///
/// Exhaustion is not an error: `Cursor::advance` reports it as `Ok(false)`.
#[derive(Debug)]
pub enum CursorError {
    /// The cursor has already been disposed.
    Disposed,

    /// `current()` was called without a successful `advance()`.
    NoCurrentItem,

    /// Operation not supported by a forward-only cursor.
    UnsupportedOperation(String),

    /// A fetch observed the cancellation signal.
    Cancelled,

    /// Channel acquisition or the network exchange failed.
    Channel(ChannelError),

    /// A batch could not be turned into typed documents.
    Materialize(String),

    /// An earlier fetch failed; the position on the server is unknown and
    /// the cursor can only be disposed.
    Faulted(String),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),
}

/// Channel-specific errors.
#[derive(Debug)]
pub enum ChannelError {
    /// Could not obtain a channel from the provider.
    AcquireFailed(String),

    /// Acquisition plus exchange did not finish in time.
    Timeout(Duration),

    /// The provider has been disposed.
    Closed,

    /// The server reply did not have the expected shape.
    Protocol(String),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// The background fetch task panicked or was aborted.
    BackgroundTask(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Disposed => write!(f, "Cursor has been disposed"),
            CursorError::NoCurrentItem => {
                write!(f, "No current item: call advance() and check it returned true")
            }
            CursorError::UnsupportedOperation(op) => write!(f, "Unsupported operation: {op}"),
            CursorError::Cancelled => write!(f, "Operation cancelled"),
            CursorError::Channel(e) => write!(f, "Channel error: {e}"),
            CursorError::Materialize(msg) => write!(f, "Failed to materialize batch: {msg}"),
            CursorError::Faulted(msg) => write!(
                f,
                "Cursor faulted on an earlier fetch ({msg}); dispose it and reissue the query"
            ),
            CursorError::Config(e) => write!(f, "Configuration error: {e}"),
            CursorError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::AcquireFailed(msg) => write!(f, "Failed to acquire channel: {msg}"),
            ChannelError::Timeout(after) => {
                write!(f, "Timed out after {} ms", after.as_millis())
            }
            ChannelError::Closed => write!(f, "Channel provider is closed"),
            ChannelError::Protocol(msg) => write!(f, "Malformed server reply: {msg}"),
            ChannelError::MongoDb(e) => format_mongodb_error(f, e),
            ChannelError::BackgroundTask(msg) => write!(f, "Background fetch failed: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CursorError::Channel(e) => Some(e),
            CursorError::Config(e) => Some(e),
            CursorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

impl CursorError {
    /// Whether this error came from the channel layer (acquisition or exchange).
    pub fn is_channel(&self) -> bool {
        matches!(self, CursorError::Channel(_))
    }
}

/* ========================= Conversions to CursorError ========================= */

impl From<io::Error> for CursorError {
    fn from(err: io::Error) -> Self {
        CursorError::Io(err)
    }
}

impl From<ChannelError> for CursorError {
    fn from(err: ChannelError) -> Self {
        CursorError::Channel(err)
    }
}

impl From<ConfigError> for CursorError {
    fn from(err: ConfigError) -> Self {
        CursorError::Config(err)
    }
}

impl From<mongodb::error::Error> for ChannelError {
    fn from(err: mongodb::error::Error) -> Self {
        ChannelError::MongoDb(err)
    }
}

impl From<mongodb::error::Error> for CursorError {
    fn from(err: mongodb::error::Error) -> Self {
        CursorError::Channel(ChannelError::MongoDb(err))
    }
}

impl From<bson::de::Error> for CursorError {
    fn from(err: bson::de::Error) -> Self {
        CursorError::Materialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = CursorError::from(ChannelError::Timeout(Duration::from_millis(1500)));
        assert_eq!(err.to_string(), "Channel error: Timed out after 1500 ms");
        assert!(err.is_channel());
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = CursorError::from(ChannelError::Closed);
        assert!(err.source().is_some());
        assert!(CursorError::Disposed.source().is_none());
    }

    #[test]
    fn test_faulted_display_keeps_original_failure() {
        let err = CursorError::Faulted("Operation cancelled".to_string());
        assert!(err.to_string().contains("Operation cancelled"));
        assert!(!err.is_channel());
    }
}
