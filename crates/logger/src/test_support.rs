//! Test support utilities
//!
//! In-memory stand-ins for the file system and the console, with failure
//! injection. Available to this crate's tests and, behind the
//! `test-support` feature, to other crates.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Console, Error, SizeProbe, Sink};

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    fail_opens: usize,
    fail_writes: usize,
    fail_renames: usize,
    fail_stats: usize,
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {what} failure"))
}

/// A shared in-memory file system.
///
/// Clones share the same files, so a test can keep a handle while the
/// engine owns the sink.
#[derive(Clone, Debug, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

impl MemoryFs {
    /// Creates an empty file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a closed sink for `path`.
    pub fn sink(&self, path: impl Into<PathBuf>) -> MemorySink {
        MemorySink {
            fs: self.clone(),
            path: path.into(),
            open: false,
        }
    }

    /// Contents of the file at `path`.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state
            .lock()
            .files
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Lines of the file at `path`; empty if it does not exist.
    pub fn lines(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.read(path)
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Every existing path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Appends raw bytes to a file, bypassing any sink.
    pub fn append_raw(&self, path: impl Into<PathBuf>, bytes: &[u8]) {
        self.state
            .lock()
            .files
            .entry(path.into())
            .or_default()
            .extend_from_slice(bytes);
    }

    /// Makes the next `count` opens fail.
    pub fn fail_opens(&self, count: usize) {
        self.state.lock().fail_opens = count;
    }

    /// Makes the next `count` writes fail.
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    /// Makes the next `count` renames fail.
    pub fn fail_renames(&self, count: usize) {
        self.state.lock().fail_renames = count;
    }

    /// Makes the next `count` size probes fail.
    pub fn fail_stats(&self, count: usize) {
        self.state.lock().fail_stats = count;
    }
}

/// Sink writing into a [`MemoryFs`].
#[derive(Debug)]
pub struct MemorySink {
    fs: MemoryFs,
    path: PathBuf,
    open: bool,
}

#[async_trait]
impl Sink for MemorySink {
    type Error = Error;
    type Probe = MemoryProbe;

    fn location(&self) -> &Path {
        &self.path
    }

    async fn open(&mut self) -> Result<(), Self::Error> {
        let mut state = self.fs.state.lock();
        if take_failure(&mut state.fail_opens) {
            return Err(Error::Io("error opening log file", injected("open")));
        }
        state.files.entry(self.path.clone()).or_default();
        drop(state);

        self.open = true;
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }

        let mut state = self.fs.state.lock();
        if take_failure(&mut state.fail_writes) {
            return Err(Error::Io("error writing log file", injected("write")));
        }
        state
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.open = false;
        Ok(())
    }

    async fn rename(&mut self, to: &Path) -> Result<(), Self::Error> {
        let mut state = self.fs.state.lock();
        if take_failure(&mut state.fail_renames) {
            return Err(Error::Io("error renaming log file", injected("rename")));
        }
        let bytes = state.files.remove(&self.path).ok_or_else(|| {
            Error::Io(
                "error renaming log file",
                io::Error::from(io::ErrorKind::NotFound),
            )
        })?;
        state.files.insert(to.to_path_buf(), bytes);
        Ok(())
    }

    fn probe(&self) -> Self::Probe {
        MemoryProbe {
            fs: self.fs.clone(),
            path: self.path.clone(),
        }
    }
}

/// Size probe over a [`MemoryFs`] path.
#[derive(Clone, Debug)]
pub struct MemoryProbe {
    fs: MemoryFs,
    path: PathBuf,
}

#[async_trait]
impl SizeProbe for MemoryProbe {
    type Error = Error;

    async fn size(&self) -> Result<u64, Self::Error> {
        let mut state = self.fs.state.lock();
        if take_failure(&mut state.fail_stats) {
            return Err(Error::Io("error reading log file metadata", injected("stat")));
        }
        state
            .files
            .get(&self.path)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| {
                Error::Io(
                    "error reading log file metadata",
                    io::Error::from(io::ErrorKind::NotFound),
                )
            })
    }
}

/// A console that captures every emitted line in memory.
#[derive(Clone, Debug, Default)]
pub struct CaptureConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CaptureConsole {
    /// Create a new capture console
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured lines
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Check if any captured line contains a specific string
    pub fn contains(&self, text: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(text))
    }

    /// Clear captured lines
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for CaptureConsole {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
