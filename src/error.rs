//! Error types and result handling for pg-apply.
//!
//! This module defines the main error type [`Error`], a convenience
//! [`Result`] type alias used throughout the crate, and the [`ErrorHandler`]
//! seam that receives conditions fatal to the writer.
//!
//! # Example
//!
//! ```rust
//! use pg_apply::{Error, Result};
//!
//! fn connect_to_target() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_target() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;
use tracing::error;

/// The main error type for pg-apply operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file, environment or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL client or protocol error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// JSON error when decoding events or encoding checkpoints.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from checkpoint file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A change event could not be turned into a target statement.
    #[error("generating sql query for {database}.{table}: {message}")]
    Render {
        database: String,
        table: String,
        message: String,
    },

    /// The target rejected or failed to run a batch.
    #[error("exec query ({bytes} bytes): {source}")]
    Execute {
        /// Size of the attempted unit, useful for oversized transactions.
        bytes: usize,
        #[source]
        source: Box<Error>,
    },

    /// An event was offered to a queue that has already been closed.
    #[error("event queue is closed")]
    QueueClosed,

    /// The retry budget was used up.
    #[error("failed to {operation} after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// A checkpoint update would move the recorded position backwards.
    #[error("checkpoint regression: {attempted} is before {current}")]
    CheckpointRegression { current: String, attempted: String },

    /// A source log position could not be parsed.
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Invalid or malformed change event on the input stream.
    #[error("Invalid message format: {message}")]
    InvalidMessage {
        /// Description of what was invalid
        message: String,
    },

    /// A spawned task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),

    /// Graceful shutdown was requested (e.g., via Ctrl+C).
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    /// Whether a failed write attempt may succeed if the write step is run again.
    ///
    /// Rendering failures depend only on the event content, so re-running the
    /// step cannot fix them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Render { .. }
            | Error::Config(_)
            | Error::QueueClosed
            | Error::CheckpointRegression { .. }
            | Error::InvalidPosition(_)
            | Error::RetriesExhausted { .. }
            | Error::Task(_)
            | Error::Shutdown => false,
            _ => true,
        }
    }
}

/// A convenient Result type alias for pg-apply operations.
///
/// This is equivalent to `std::result::Result<T, pg_apply::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Receives conditions that are terminal for a component.
///
/// The writer calls [`ErrorHandler::fatal`] once, right before it stops, with
/// the error that ended it.
pub trait ErrorHandler: Send + Sync {
    fn fatal(&self, component: &str, err: &Error);
}

/// Reports fatal errors through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn fatal(&self, component: &str, err: &Error) {
        error!(component = component, error = %err, "Fatal error, component stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_errors_are_not_retryable() {
        let err = Error::Render {
            database: "db".to_string(),
            table: "t".to_string(),
            message: "missing row image".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "generating sql query for db.t: missing row image"
        );
    }

    #[test]
    fn test_execute_error_reports_size() {
        let err = Error::Execute {
            bytes: 42,
            source: Box::new(Error::Connection("connection reset".to_string())),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "exec query (42 bytes): Connection error: connection reset"
        );
    }
}
