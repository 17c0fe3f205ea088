//! Unbuffered console output.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Receives rendered lines that bypass the queue.
pub trait Console: Send + Sync + 'static {
    /// Write one line, synchronously.
    fn emit(&self, line: &str);
}

/// Writes each line to stdout and flushes immediately.
#[derive(Clone, Debug)]
pub struct Stdout {
    /// Lock for stdout (to prevent interleaving)
    stdout: Arc<Mutex<std::io::Stdout>>,
}

impl Stdout {
    /// Create a new stdout console
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdout: Arc::new(Mutex::new(std::io::stdout())),
        }
    }
}

impl Default for Stdout {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for Stdout {
    fn emit(&self, line: &str) {
        if let Ok(mut stdout) = self.stdout.lock() {
            let _ = writeln!(stdout, "{line}");
            let _ = stdout.flush();
        }
    }
}
