use std::error::Error as StdError;
use std::fmt::Debug;

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Marker trait for errors raised by a [`Sink`](crate::Sink) or
/// [`SizeProbe`](crate::SizeProbe).
pub trait SinkError: Debug + StdError + Send + Sync + 'static {}

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A string could not be parsed as a destination kind.
    #[error("unrecognized destination: {0}")]
    InvalidDestination(String),

    /// A string could not be parsed as a severity.
    #[error("unrecognized severity: {0}")]
    InvalidLevel(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The sink was used while its stream was not open.
    #[error("stream is not open")]
    NotOpen,
}

impl SinkError for Error {}
