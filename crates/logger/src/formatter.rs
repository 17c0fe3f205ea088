//! Rendering of records into output lines.
//!
//! Three layouts are available: [`JsonFormatter`] (one JSON object per
//! event), [`PlainTextFormatter`] and [`ColorFormatter`] (the same bracketed
//! layout, the latter with ANSI escapes). [`Renderer`] picks one from a
//! [`Config`] and applies the truncation rule.

use std::fmt::Write;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;

use crate::{Config, Level, Record};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const ORANGE: &str = "\x1b[33m";
const YELLOW: &str = "\x1b[38;5;226m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

/// Marker appended to truncated lines.
pub const ELLIPSIS: &str = "...";

/// Renders a record into a single line (without the trailing newline).
pub trait LogFormatter: Send + Sync + 'static {
    /// Render the record.
    fn format(&self, record: &Record) -> String;
}

fn iso_date(record: &Record) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One JSON object per event:
/// `{"name","severity","date","message","optionalParams"}`.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    name: String,
}

impl JsonFormatter {
    /// Create a formatter that writes `name` into every object.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    name: &'a str,
    severity: &'static str,
    date: String,
    message: &'a str,
    #[serde(rename = "optionalParams")]
    optional_params: &'a [Value],
}

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &Record) -> String {
        let event = JsonEvent {
            name: &self.name,
            severity: record.level.as_str(),
            date: iso_date(record),
            message: &record.message,
            optional_params: &record.attachments,
        };

        // Strings and JSON values always serialize.
        serde_json::to_string(&event).unwrap_or_default()
    }
}

/// `<prefix> [<severity>][<date>][<message>][ <a1>  <a2> ]`
#[derive(Clone, Debug, Default)]
pub struct PlainTextFormatter {
    prefix: String,
}

impl PlainTextFormatter {
    /// Create a formatter with the given line prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl LogFormatter for PlainTextFormatter {
    fn format(&self, record: &Record) -> String {
        let mut attachments = String::from("[");
        for value in &record.attachments {
            let _ = write!(attachments, " {value} ");
        }
        attachments.push(']');

        format!(
            "{} [{}][{}][{}]{}",
            self.prefix,
            record.level,
            iso_date(record),
            record.message,
            attachments
        )
    }
}

/// The plain layout wrapped in ANSI escapes, with the severity color-coded.
#[derive(Clone, Debug, Default)]
pub struct ColorFormatter {
    prefix: String,
}

impl ColorFormatter {
    /// Create a formatter with the given line prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    const fn severity_color(level: Level) -> Option<&'static str> {
        match level {
            Level::Debug => Some(CYAN),
            Level::Info => None,
            Level::Warning => Some(YELLOW),
            Level::Error | Level::Critical => Some(RED),
        }
    }
}

impl LogFormatter for ColorFormatter {
    fn format(&self, record: &Record) -> String {
        let severity = match Self::severity_color(record.level) {
            Some(color) => format!("{GREEN}[{color}{}{GREEN}]", record.level),
            None => format!("{GREEN}[{}]", record.level),
        };

        let mut attachments = format!("{GREEN}[");
        for value in &record.attachments {
            let _ = write!(attachments, " {YELLOW}{value} ");
        }
        let _ = write!(attachments, "{GREEN}]");

        format!(
            "{RESET}{WHITE}{} {severity}{GREEN}[{ORANGE}{}{GREEN}][{}]{attachments}",
            self.prefix,
            iso_date(record),
            record.message,
        )
    }
}

/// Cuts `line` to `max_len` characters and appends [`ELLIPSIS`].
///
/// A `max_len` of 0 disables truncation. Lines of at most `max_len`
/// characters are returned untouched.
#[must_use]
pub fn truncate(line: String, max_len: usize) -> String {
    if max_len == 0 {
        return line;
    }

    match line.char_indices().nth(max_len) {
        Some((cut, _)) => {
            let mut truncated = line;
            truncated.truncate(cut);
            truncated.push_str(ELLIPSIS);
            truncated
        }
        None => line,
    }
}

/// Formatter selected from a configuration, plus the truncation rule.
pub struct Renderer {
    formatter: Box<dyn LogFormatter>,
    max_len: usize,
}

impl Renderer {
    /// Pick the layout for `config`.
    ///
    /// JSON wins over color; color is only used for console output.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let formatter: Box<dyn LogFormatter> = if config.json {
            Box::new(JsonFormatter::new(config.prefix.clone()))
        } else if config.colored() {
            Box::new(ColorFormatter::new(config.prefix.clone()))
        } else {
            Box::new(PlainTextFormatter::new(config.prefix.clone()))
        };

        Self::new(formatter, config.max_event_length)
    }

    /// Wrap an arbitrary formatter.
    #[must_use]
    pub fn new(formatter: Box<dyn LogFormatter>, max_len: usize) -> Self {
        Self { formatter, max_len }
    }

    /// Render and truncate one record.
    #[must_use]
    pub fn render(&self, record: &Record) -> String {
        truncate(self.formatter.format(record), self.max_len)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}
