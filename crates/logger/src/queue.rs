//! FIFO of rendered lines awaiting the drain loop.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Unbounded, append-only queue of rendered lines.
///
/// Producers only push; only the drain loop and the terminal flush pop, so
/// lines leave in exactly the order they were accepted.
#[derive(Debug, Default)]
pub struct PendingQueue {
    lines: Mutex<VecDeque<String>>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line at the back.
    pub fn push(&self, line: String) {
        self.lines.lock().push_back(line);
    }

    /// Puts a line back at the front, ahead of everything queued.
    ///
    /// Only the drain loop calls this, for a line it popped but could not
    /// hand to the writer.
    pub fn requeue(&self, line: String) {
        self.lines.lock().push_front(line);
    }

    /// Removes the oldest line.
    pub fn pop(&self) -> Option<String> {
        self.lines.lock().pop_front()
    }

    /// Removes and returns every queued line, oldest first.
    pub fn take_all(&self) -> Vec<String> {
        self.lines.lock().drain(..).collect()
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Discards every queued line.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}
