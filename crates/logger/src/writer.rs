//! Destination writer: buffering, backpressure and stream-error recovery.

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::Sink;

/// Reopen policy after a stream error.
///
/// The n-th consecutive failure schedules a reopen after `n * base_delay`;
/// once `max_attempts` reopens have failed the writer is disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reopen attempts before giving up.
    pub max_attempts: u32,
    /// Delay unit between attempts.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before reopen attempt number `attempt` (1-based).
    #[must_use]
    pub const fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Lifecycle of a [`DestinationWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// No stream is open.
    Closed,
    /// The stream is open and below its high-water mark.
    Writable,
    /// The stream is open but its buffer is full; wait for a drain.
    Blocked,
    /// The stream failed; a reopen is scheduled.
    Retrying {
        /// Consecutive failures so far.
        attempt: u32,
        /// When the reopen is due.
        retry_at: Instant,
    },
    /// Reopening failed too many times. Terminal.
    Disabled,
}

impl WriterState {
    /// Whether a stream is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Writable | Self::Blocked)
    }
}

/// Owns one [`Sink`] and buffers lines in front of it.
///
/// `write` only appends to an in-memory buffer and reports backpressure once
/// the buffer reaches the high-water mark; `drain` pushes the buffer to the
/// sink. Any sink error closes the stream and schedules a reopen according
/// to the [`RetryPolicy`]. Unwritten lines survive a reopen.
///
/// The buffer keeps lines whole, so a line with embedded newlines is still
/// one entry when it is handed back by [`take_unwritten`](Self::take_unwritten).
pub struct DestinationWriter<S: Sink> {
    sink: S,
    state: WriterState,
    buffer: Vec<String>,
    buffered_bytes: usize,
    high_water_mark: usize,
    policy: RetryPolicy,
    attempts: u32,
    status: watch::Sender<WriterState>,
}

impl<S: Sink> DestinationWriter<S> {
    /// Creates a closed writer around `sink`.
    pub fn new(sink: S, high_water_mark: usize, policy: RetryPolicy) -> Self {
        let (status, _) = watch::channel(WriterState::Closed);

        Self {
            sink,
            state: WriterState::Closed,
            buffer: Vec::new(),
            buffered_bytes: 0,
            high_water_mark: high_water_mark.max(1),
            policy,
            attempts: 0,
            status,
        }
    }

    /// Current state.
    pub const fn state(&self) -> WriterState {
        self.state
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<WriterState> {
        self.status.subscribe()
    }

    /// Whether another line may be written without exceeding the buffer.
    pub fn accepts_more(&self) -> bool {
        self.state == WriterState::Writable
    }

    /// Bytes waiting to be drained.
    pub const fn buffered(&self) -> usize {
        self.buffered_bytes
    }

    /// Path of the underlying resource.
    pub fn location(&self) -> &Path {
        self.sink.location()
    }

    /// Size probe of the underlying resource.
    pub fn probe(&self) -> S::Probe {
        self.sink.probe()
    }

    fn set_state(&mut self, state: WriterState) {
        self.state = state;
        self.status.send_replace(state);
    }

    /// Opens the stream; a failure enters the retry protocol.
    pub async fn open(&mut self) {
        if self.state.is_open() || self.state == WriterState::Disabled {
            return;
        }

        match self.sink.open().await {
            Ok(()) => {
                debug!(path = %self.location().display(), "log stream opened");
                self.attempts = 0;
                self.set_state(WriterState::Writable);
            }
            Err(e) => self.fail(&e).await,
        }
    }

    /// Buffers `line` plus a newline.
    ///
    /// Returns `Ok(true)` while the writer accepts more, `Ok(false)` once the
    /// buffer has reached its high-water mark (the line is still accepted).
    /// A line offered while no stream is open is handed back in `Err`.
    pub fn write(&mut self, line: String) -> Result<bool, String> {
        if !self.state.is_open() {
            return Err(line);
        }

        self.buffered_bytes += line.len() + 1;
        self.buffer.push(line);

        if self.buffered_bytes >= self.high_water_mark {
            if self.state != WriterState::Blocked {
                self.set_state(WriterState::Blocked);
            }
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Pushes buffered bytes to the sink.
    ///
    /// Success is the drain signal: a blocked writer becomes writable again.
    pub async fn drain(&mut self) {
        if !self.state.is_open() {
            return;
        }

        if !self.buffer.is_empty() {
            let mut bytes = Vec::with_capacity(self.buffered_bytes);
            for line in &self.buffer {
                bytes.extend_from_slice(line.as_bytes());
                bytes.push(b'\n');
            }

            if let Err(e) = self.sink.write_all(&bytes).await {
                self.fail(&e).await;
                return;
            }
            self.buffer.clear();
            self.buffered_bytes = 0;
        }

        if self.state == WriterState::Blocked {
            self.set_state(WriterState::Writable);
        }
    }

    /// Reopens the stream if a scheduled retry is due.
    pub async fn retry_if_due(&mut self) {
        if let WriterState::Retrying { retry_at, .. } = self.state {
            if Instant::now() >= retry_at {
                self.reopen().await;
            }
        }
    }

    /// Reopens the stream immediately if a retry is pending.
    pub async fn retry_now(&mut self) {
        if matches!(self.state, WriterState::Retrying { .. }) {
            self.reopen().await;
        }
    }

    async fn reopen(&mut self) {
        match self.sink.open().await {
            Ok(()) => {
                info!(path = %self.location().display(), "log stream re-opened");
                self.attempts = 0;
                self.set_state(WriterState::Writable);
            }
            Err(e) => self.fail(&e).await,
        }
    }

    async fn fail(&mut self, err: &S::Error) {
        error!(path = %self.location().display(), error = %err, "log stream error");

        if let Err(close_err) = self.sink.close().await {
            warn!(error = %close_err, "error closing log stream after failure");
        }

        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            let delay = self.policy.delay(self.attempts);
            warn!(attempt = self.attempts, ?delay, "scheduling log stream reopen");
            self.set_state(WriterState::Retrying {
                attempt: self.attempts,
                retry_at: Instant::now() + delay,
            });
        } else {
            error!(
                path = %self.location().display(),
                "max retries reached for log stream; file logging disabled"
            );
            self.set_state(WriterState::Disabled);
        }
    }

    /// Archives the current file under `archive` and starts a fresh one.
    ///
    /// The buffer is drained and the stream closed before the rename. If the
    /// rename fails the original file is reopened and kept. Returns whether
    /// the file was archived.
    pub async fn rotate(&mut self, archive: &Path) -> bool {
        if !self.state.is_open() {
            return false;
        }

        self.set_state(WriterState::Blocked);
        self.drain().await;
        if !self.state.is_open() {
            return false;
        }

        if let Err(e) = self.sink.close().await {
            self.fail(&e).await;
            return false;
        }
        self.set_state(WriterState::Closed);

        let archived = match self.sink.rename(archive).await {
            Ok(()) => {
                info!(
                    path = %self.location().display(),
                    archive = %archive.display(),
                    "log file rotated"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "error archiving log file; continuing with current file");
                false
            }
        };

        self.attempts = 0;
        self.open().await;

        archived
    }

    /// Drains what it can and closes the stream.
    ///
    /// A pending retry is attempted immediately, and once more if the final
    /// drain fails. Returns the lines that could not be written.
    pub async fn close(&mut self) -> Vec<String> {
        self.retry_now().await;
        self.drain().await;
        if matches!(self.state, WriterState::Retrying { .. }) {
            self.retry_now().await;
            self.drain().await;
        }

        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "error closing log stream");
        }
        if self.state != WriterState::Disabled {
            self.set_state(WriterState::Closed);
        }

        self.take_unwritten()
    }

    /// Removes buffered lines that never reached the sink, in write order.
    pub fn take_unwritten(&mut self) -> Vec<String> {
        self.buffered_bytes = 0;
        std::mem::take(&mut self.buffer)
    }
}

impl<S: Sink> std::fmt::Debug for DestinationWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationWriter")
            .field("location", &self.location())
            .field("state", &self.state)
            .field("buffered", &self.buffered_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    use crate::SizeProbe;
    use crate::test_support::{MemoryFs, MemorySink};

    const PATH: &str = "/logs/app.log";

    fn writer(fs: &MemoryFs, high_water_mark: usize) -> DestinationWriter<MemorySink> {
        DestinationWriter::new(fs.sink(PATH), high_water_mark, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_write_and_drain() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;

        assert_eq!(writer.write("one".to_string()), Ok(true));
        assert_eq!(writer.write("two".to_string()), Ok(true));
        assert_eq!(fs.read(PATH).as_deref(), Some(""));

        writer.drain().await;

        assert_eq!(fs.lines(PATH), vec!["one", "two"]);
        assert_eq!(writer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_backpressure_until_drained() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 10);
        writer.open().await;

        assert_eq!(writer.write("12345".to_string()), Ok(true));
        assert_eq!(writer.write("67890".to_string()), Ok(false));
        assert_eq!(writer.state(), WriterState::Blocked);
        assert!(!writer.accepts_more());

        writer.drain().await;

        assert_eq!(writer.state(), WriterState::Writable);
        assert_eq!(fs.lines(PATH), vec!["12345", "67890"]);
    }

    #[tokio::test]
    async fn test_write_while_closed_hands_line_back() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);

        assert_eq!(writer.write("lost?".to_string()), Err("lost?".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_retries_and_keeps_buffer() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;

        fs.fail_writes(1);
        writer.write("kept".to_string()).unwrap();
        writer.drain().await;

        assert_matches!(writer.state(), WriterState::Retrying { attempt: 1, .. });
        assert!(writer.write("refused".to_string()).is_err());

        tokio::time::advance(Duration::from_millis(999)).await;
        writer.retry_if_due().await;
        assert_matches!(writer.state(), WriterState::Retrying { attempt: 1, .. });

        tokio::time::advance(Duration::from_millis(1)).await;
        writer.retry_if_due().await;
        assert_eq!(writer.state(), WriterState::Writable);

        writer.drain().await;
        assert_eq!(fs.lines(PATH), vec!["kept"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_then_disabled() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        let policy = RetryPolicy::default();

        fs.fail_opens(usize::MAX);
        writer.open().await;

        for attempt in 1..=policy.max_attempts {
            assert_matches!(
                writer.state(),
                WriterState::Retrying { attempt: a, .. } if a == attempt
            );

            tokio::time::advance(policy.delay(attempt) - Duration::from_millis(1)).await;
            writer.retry_if_due().await;
            assert_matches!(
                writer.state(),
                WriterState::Retrying { attempt: a, .. } if a == attempt
            );

            tokio::time::advance(Duration::from_millis(1)).await;
            writer.retry_if_due().await;
        }

        assert_eq!(writer.state(), WriterState::Disabled);

        // Disabled is terminal.
        fs.fail_opens(0);
        writer.open().await;
        writer.retry_now().await;
        assert_eq!(writer.state(), WriterState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reopen_resets_attempts() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);

        fs.fail_opens(2);
        writer.open().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        writer.retry_if_due().await;
        assert_matches!(writer.state(), WriterState::Retrying { attempt: 2, .. });

        tokio::time::advance(Duration::from_secs(2)).await;
        writer.retry_if_due().await;
        assert_eq!(writer.state(), WriterState::Writable);

        fs.fail_writes(1);
        writer.write("x".to_string()).unwrap();
        writer.drain().await;
        assert_matches!(writer.state(), WriterState::Retrying { attempt: 1, .. });
    }

    #[tokio::test]
    async fn test_rotate_archives_and_reopens() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;

        writer.write("before".to_string()).unwrap();
        assert!(writer.rotate(Path::new("/logs/app_old.log")).await);

        assert_eq!(writer.state(), WriterState::Writable);
        assert_eq!(fs.lines("/logs/app_old.log"), vec!["before"]);
        assert_eq!(fs.read(PATH).as_deref(), Some(""));

        writer.write("after".to_string()).unwrap();
        writer.drain().await;
        assert_eq!(fs.lines(PATH), vec!["after"]);
    }

    #[tokio::test]
    async fn test_rotate_with_failed_rename_keeps_file() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;
        writer.write("before".to_string()).unwrap();

        fs.fail_renames(1);
        assert!(!writer.rotate(Path::new("/logs/app_old.log")).await);

        writer.write("after".to_string()).unwrap();
        writer.drain().await;

        assert_eq!(writer.state(), WriterState::Writable);
        assert_eq!(fs.lines(PATH), vec!["before", "after"]);
        assert_eq!(fs.read("/logs/app_old.log"), None);
    }

    #[tokio::test]
    async fn test_close_returns_unwritten_lines() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;
        writer.write("a".to_string()).unwrap();
        writer.write("b".to_string()).unwrap();

        fs.fail_writes(2);
        let unwritten = writer.close().await;

        assert_eq!(unwritten, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(writer.state(), WriterState::Closed);
    }

    #[tokio::test]
    async fn test_unwritten_multiline_event_stays_whole() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;
        writer.write("line one\nline two".to_string()).unwrap();
        writer.write("crlf\r\nend".to_string()).unwrap();
        assert_eq!(writer.buffered(), 28);

        fs.fail_writes(2);
        let unwritten = writer.close().await;

        assert_eq!(
            unwritten,
            vec!["line one\nline two".to_string(), "crlf\r\nend".to_string()]
        );
        assert_eq!(writer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_probe_size() {
        let fs = MemoryFs::new();
        let mut writer = writer(&fs, 1024);
        writer.open().await;
        writer.write("abc".to_string()).unwrap();
        writer.drain().await;

        let probe = writer.probe();
        assert_eq!(probe.size().await.unwrap(), 4);
    }
}
