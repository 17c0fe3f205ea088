//! File-backed sink.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{Error, SizeProbe, Sink};

/// Appends to a file on disk.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Creates a closed sink for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Whether the stream is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

#[async_trait]
impl Sink for FileSink {
    type Error = Error;
    type Probe = FileProbe;

    fn location(&self) -> &Path {
        &self.path
    }

    async fn open(&mut self) -> Result<(), Self::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Io("error opening log file", e))?;
        self.file = Some(file);
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let file = self.file.as_mut().ok_or(Error::NotOpen)?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::Io("error writing log file", e))?;
        file.flush()
            .await
            .map_err(|e| Error::Io("error flushing log file", e))
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::Io("error flushing log file", e))?;
        }
        Ok(())
    }

    async fn rename(&mut self, to: &Path) -> Result<(), Self::Error> {
        fs::rename(&self.path, to)
            .await
            .map_err(|e| Error::Io("error renaming log file", e))
    }

    fn probe(&self) -> Self::Probe {
        FileProbe {
            path: self.path.clone(),
        }
    }
}

/// Stats a log file by path.
#[derive(Clone, Debug)]
pub struct FileProbe {
    path: PathBuf,
}

#[async_trait]
impl SizeProbe for FileProbe {
    type Error = Error;

    async fn size(&self) -> Result<u64, Self::Error> {
        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| Error::Io("error reading log file metadata", e))?;
        Ok(metadata.len())
    }
}
