//! Abstract interface over the byte stream a writer drains into.

use std::path::Path;

use async_trait::async_trait;

use crate::SinkError;

/// An append-only byte stream backed by a named resource (usually a file).
///
/// The [`DestinationWriter`](crate::DestinationWriter) is the only caller; it
/// never calls two methods concurrently.
#[async_trait]
pub trait Sink: Send + 'static {
    /// The error type for stream operations.
    type Error: SinkError;

    /// Detached handle used to stat the resource.
    type Probe: SizeProbe;

    /// Path of the backing resource.
    fn location(&self) -> &Path;

    /// Opens the resource for appending, creating it if missing.
    async fn open(&mut self) -> Result<(), Self::Error>;

    /// Appends all of `bytes` to the open stream.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Flushes and releases the stream. Closing a closed sink is a no-op.
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Moves the backing resource to `to`. Only called while closed.
    async fn rename(&mut self, to: &Path) -> Result<(), Self::Error>;

    /// Returns a probe for the current size of the resource.
    fn probe(&self) -> Self::Probe;
}

/// Reports the size of a sink's backing resource without touching its stream.
#[async_trait]
pub trait SizeProbe: Send + Sync + 'static {
    /// The error type for probe operations.
    type Error: SinkError;

    /// Current size in bytes.
    async fn size(&self) -> Result<u64, Self::Error>;
}
