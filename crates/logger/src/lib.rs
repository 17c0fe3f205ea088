//! In-process queued log writer.
//!
//! Callers log through a [`Logger`] without ever blocking on I/O. Console
//! output is written immediately; file output is rendered, queued and moved
//! to the file by a periodic drain loop that honors the writer's
//! backpressure, reopens the file after I/O errors with a linear backoff and
//! rotates it once it grows past a size ceiling.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod console;
mod dispatch;
mod error;
mod file;
mod formatter;
mod level;
mod logger;
mod queue;
mod record;
mod rotation;
mod sink;
mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{Config, ConfigBuilder, Destination};
pub use console::{Console, Stdout};
pub use dispatch::DispatchState;
pub use error::{Error, Result, SinkError};
pub use file::{FileProbe, FileSink};
pub use formatter::{
    ColorFormatter, ELLIPSIS, JsonFormatter, LogFormatter, PlainTextFormatter, Renderer, truncate,
};
pub use level::Level;
pub use logger::Logger;
pub use queue::PendingQueue;
pub use record::Record;
pub use rotation::{RotationManager, archive_path};
pub use sink::{SizeProbe, Sink};
pub use writer::{DestinationWriter, RetryPolicy, WriterState};
