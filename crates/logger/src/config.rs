//! Engine configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Level, RetryPolicy};

const ONE_MB_BYTES: u64 = 1_048_576;

/// Where accepted events are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Emit each event to the console immediately, unbuffered.
    #[default]
    Console,
    /// Queue events and drain them to a file.
    File,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => f.write_str("console"),
            Self::File => f.write_str("file"),
        }
    }
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(Self::Console),
            "file" => Ok(Self::File),
            _ => Err(Error::InvalidDestination(s.to_string())),
        }
    }
}

/// Configuration for a [`Logger`](crate::Logger).
///
/// Set once at initialization and immutable until the logger is closed.
/// Unknown keys are rejected when deserializing; out-of-range values are
/// replaced by their defaults in [`Config::normalized`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Name written at the start of every event.
    pub prefix: String,

    /// Events below this severity are dropped.
    pub min_level: Level,

    /// Rendered events longer than this are truncated. 0 means unlimited.
    pub max_event_length: usize,

    /// Console or file.
    pub destination: Destination,

    /// ANSI color for console output. Ignored in JSON mode.
    pub color: bool,

    /// Render each event as a single JSON object.
    pub json: bool,

    /// Log file path. Required when `destination` is `File`.
    pub path: Option<PathBuf>,

    /// Period of the drain loop, in milliseconds.
    pub drain_period_ms: u64,

    /// Rotate the log file once it grows past `rotate_size_mb`.
    pub rotate: bool,

    /// Rotation ceiling in megabytes.
    pub rotate_size_mb: u64,

    /// How often the file size is checked against the ceiling, in milliseconds.
    pub rotation_check_ms: u64,

    /// Send events to the console once file logging has been disabled.
    pub console_fallback: bool,

    /// Buffered bytes at which the file writer reports backpressure.
    pub write_buffer_bytes: usize,

    /// Reopen attempts before file logging is disabled.
    pub retry_max_attempts: u32,

    /// Base delay between reopen attempts, in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Config {
    /// 100ms drain period.
    pub const DRAIN_FAST: Duration = Duration::from_millis(100);
    /// 250ms drain period.
    pub const DRAIN_STANDARD: Duration = Duration::from_millis(250);
    /// 500ms drain period.
    pub const DRAIN_MEDIUM: Duration = Duration::from_millis(500);
    /// 1s drain period.
    pub const DRAIN_SLOW: Duration = Duration::from_millis(1000);

    /// Default rotation ceiling in megabytes.
    pub const DEFAULT_ROTATE_SIZE_MB: u64 = 10;
    /// Default interval between rotation checks.
    pub const DEFAULT_ROTATION_CHECK: Duration = Duration::from_secs(10);
    /// Default backpressure threshold of the file writer.
    pub const DEFAULT_WRITE_BUFFER_BYTES: usize = 16 * 1024;

    /// Starts a new builder with default settings.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Replaces invalid values with defaults.
    ///
    /// A file destination without a path falls back to the console.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        if self.drain_period_ms == 0 {
            self.drain_period_ms = defaults.drain_period_ms;
        }
        if self.rotation_check_ms == 0 {
            self.rotation_check_ms = defaults.rotation_check_ms;
        }
        if self.write_buffer_bytes == 0 {
            self.write_buffer_bytes = defaults.write_buffer_bytes;
        }
        if self
            .path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.path = None;
        }
        if self.destination == Destination::File && self.path.is_none() {
            self.destination = Destination::Console;
        }

        self
    }

    /// Path of the log file, if events are file-backed.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        match self.destination {
            Destination::File => self.path.as_deref(),
            Destination::Console => None,
        }
    }

    /// Period of the drain loop.
    #[must_use]
    pub const fn drain_period(&self) -> Duration {
        Duration::from_millis(self.drain_period_ms)
    }

    /// Interval between rotation checks.
    #[must_use]
    pub const fn rotation_check_period(&self) -> Duration {
        Duration::from_millis(self.rotation_check_ms)
    }

    /// Size in bytes at which the file is rotated.
    ///
    /// Only set when rotation is enabled for a file destination with a
    /// positive ceiling.
    #[must_use]
    pub fn rotation_ceiling(&self) -> Option<u64> {
        if self.rotate && self.rotate_size_mb > 0 && self.file_path().is_some() {
            Some(self.rotate_size_mb.saturating_mul(ONE_MB_BYTES))
        } else {
            None
        }
    }

    /// Reopen policy for the file writer.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Whether events are rendered with ANSI colors.
    ///
    /// Color applies to console output only and never to JSON.
    #[must_use]
    pub fn colored(&self) -> bool {
        self.color && !self.json && self.file_path().is_none()
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();

        Self {
            prefix: String::new(),
            min_level: Level::Info,
            max_event_length: 0,
            destination: Destination::Console,
            color: true,
            json: false,
            path: None,
            drain_period_ms: 100,
            rotate: false,
            rotate_size_mb: Self::DEFAULT_ROTATE_SIZE_MB,
            rotation_check_ms: 10_000,
            console_fallback: false,
            write_buffer_bytes: Self::DEFAULT_WRITE_BUFFER_BYTES,
            retry_max_attempts: retry.max_attempts,
            #[allow(clippy::cast_possible_truncation)]
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
        }
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the name written at the start of every event.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub fn min_level(mut self, level: Level) -> Self {
        self.config.min_level = level;
        self
    }

    /// Sets the truncation length (0 for unlimited).
    #[must_use]
    pub fn max_event_length(mut self, len: usize) -> Self {
        self.config.max_event_length = len;
        self
    }

    /// Writes to the console.
    #[must_use]
    pub fn console(mut self) -> Self {
        self.config.destination = Destination::Console;
        self.config.path = None;
        self
    }

    /// Writes to the file at `path`.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.destination = Destination::File;
        self.config.path = Some(path.into());
        self
    }

    /// Enables or disables ANSI colors.
    #[must_use]
    pub fn color(mut self, color: bool) -> Self {
        self.config.color = color;
        self
    }

    /// Enables or disables JSON rendering.
    #[must_use]
    pub fn json(mut self, json: bool) -> Self {
        self.config.json = json;
        self
    }

    /// Sets the drain loop period.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn drain_period(mut self, period: Duration) -> Self {
        self.config.drain_period_ms = period.as_millis() as u64;
        self
    }

    /// Rotates the file once it reaches `size_mb` megabytes.
    #[must_use]
    pub fn rotate_at_mb(mut self, size_mb: u64) -> Self {
        self.config.rotate = true;
        self.config.rotate_size_mb = size_mb;
        self
    }

    /// Sets how often the file size is checked.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn rotation_check_period(mut self, period: Duration) -> Self {
        self.config.rotation_check_ms = period.as_millis() as u64;
        self
    }

    /// Falls back to the console once file logging is disabled.
    #[must_use]
    pub fn console_fallback(mut self, enabled: bool) -> Self {
        self.config.console_fallback = enabled;
        self
    }

    /// Sets the backpressure threshold of the file writer.
    #[must_use]
    pub fn write_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.write_buffer_bytes = bytes;
        self
    }

    /// Sets the reopen policy of the file writer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_max_attempts = policy.max_attempts;
        self.config.retry_base_delay_ms = policy.base_delay.as_millis() as u64;
        self
    }

    /// Builds the configuration, applying defaults for invalid values.
    #[must_use]
    pub fn build(self) -> Config {
        self.config.normalized()
    }
}
