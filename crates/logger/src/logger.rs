//! The engine: lifecycle, filtering and routing.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::{FilePipeline, Pipeline};
use crate::{
    Config, Console, DispatchState, FileSink, Level, Record, Renderer, Result, Sink, Stdout,
    WriterState,
};

/// Handle to a queued logger.
///
/// Cheap to clone; clones share one engine. A logger starts uninitialized
/// and drops everything logged until [`init`](Self::init). After
/// [`close`](Self::close) it can be initialized again.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    /// Serializes init and close.
    transition: tokio::sync::Mutex<()>,
    session: RwLock<Option<Arc<Session>>>,
    console: Arc<dyn Console>,
}

/// State between one `init` and the matching `close`.
struct Session {
    config: Config,
    renderer: Renderer,
    /// False once close has been requested. Held for reading while a line
    /// is accepted so that nothing is enqueued behind the final flush.
    accepting: RwLock<bool>,
    route: Route,
}

enum Route {
    Console(Arc<dyn Console>),
    Queued(Box<dyn Pipeline>),
}

impl Logger {
    /// Creates an uninitialized logger whose console is stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_console(Arc::new(Stdout::new()))
    }

    /// Creates an uninitialized logger writing console output to `console`.
    #[must_use]
    pub fn with_console(console: Arc<dyn Console>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transition: tokio::sync::Mutex::new(()),
                session: RwLock::new(None),
                console,
            }),
        }
    }

    /// Process-wide logger, for code that cannot thread a handle through.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Logger> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Initializes the logger. A no-op while already initialized.
    ///
    /// A file destination opens the file in append mode and starts the drain
    /// loop (and the rotation manager, if enabled). Open failures are not
    /// returned; they enter the writer's retry protocol.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn init(&self, config: Config) {
        let config = config.normalized();
        let sink = config.file_path().map(FileSink::new);
        self.install(config, sink).await;
    }

    /// Initializes the logger with a caller-provided sink, which replaces
    /// the configured destination.
    pub async fn init_with_sink<S: Sink>(&self, mut config: Config, sink: S) {
        config.destination = crate::Destination::File;
        config.path = Some(PathBuf::from(sink.location()));
        self.install(config.normalized(), Some(sink)).await;
    }

    async fn install<S: Sink>(&self, config: Config, sink: Option<S>) {
        let _transition = self.inner.transition.lock().await;
        if self.inner.session.read().is_some() {
            debug!("logger already initialized");
            return;
        }

        let route = match sink {
            Some(sink) => {
                let fallback = config
                    .console_fallback
                    .then(|| self.inner.console.clone());
                Route::Queued(Box::new(FilePipeline::start(sink, &config, fallback).await))
            }
            None => Route::Console(self.inner.console.clone()),
        };

        debug!(
            destination = %config.destination,
            min_level = %config.min_level,
            "logger initialized"
        );

        let session = Session {
            renderer: Renderer::from_config(&config),
            config,
            accepting: RwLock::new(true),
            route,
        };
        *self.inner.session.write() = Some(Arc::new(session));
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.read().clone()
    }

    /// Logs one event. Never blocks on I/O and never fails.
    ///
    /// Events below the minimum severity, events logged before `init` and
    /// events logged after `close` was requested are dropped.
    pub fn log(&self, level: Level, message: impl Into<String>, attachments: &[Value]) {
        let Some(session) = self.session() else {
            return;
        };
        let accepting = session.accepting.read();
        if !*accepting {
            return;
        }

        if let Route::Queued(pipeline) = &session.route {
            pipeline.ensure_scheduled();
        }

        if level < session.config.min_level {
            return;
        }

        let record = Record::new(level, message).with_attachments(attachments);
        let line = session.renderer.render(&record);

        match &session.route {
            Route::Console(console) => console.emit(&line),
            Route::Queued(pipeline) => pipeline.enqueue(line),
        }
    }

    /// Logs at [`Level::Debug`].
    pub fn debug(&self, message: impl Into<String>, attachments: &[Value]) {
        self.log(Level::Debug, message, attachments);
    }

    /// Logs at [`Level::Info`].
    pub fn info(&self, message: impl Into<String>, attachments: &[Value]) {
        self.log(Level::Info, message, attachments);
    }

    /// Logs at [`Level::Warning`].
    pub fn warn(&self, message: impl Into<String>, attachments: &[Value]) {
        self.log(Level::Warning, message, attachments);
    }

    /// Logs at [`Level::Error`].
    pub fn error(&self, message: impl Into<String>, attachments: &[Value]) {
        self.log(Level::Error, message, attachments);
    }

    /// Logs at [`Level::Critical`].
    pub fn critical(&self, message: impl Into<String>, attachments: &[Value]) {
        self.log(Level::Critical, message, attachments);
    }

    /// Stops accepting events, flushes everything already accepted and
    /// closes the destination.
    ///
    /// Resolves once the file has been closed; the logger may then be
    /// initialized again. Resolves immediately for a console logger or one
    /// that was never initialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Join`](crate::Error::Join) if the drain loop
    /// panicked. The flush and close are performed regardless.
    pub async fn close(&self) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        let Some(session) = self.session() else {
            return Ok(());
        };

        *session.accepting.write() = false;

        let result = match &session.route {
            Route::Console(_) => Ok(()),
            Route::Queued(pipeline) => pipeline.shutdown().await,
        };

        *self.inner.session.write() = None;
        debug!("logger closed");

        result
    }

    /// Whether `init` has completed and `close` has not.
    pub fn is_initialized(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// Lines queued for the drain loop.
    pub fn pending(&self) -> usize {
        match self.session().as_deref().map(|session| &session.route) {
            Some(Route::Queued(pipeline)) => pipeline.pending(),
            _ => 0,
        }
    }

    /// State of the drain loop; `Idle` unless file-backed.
    pub fn dispatch_state(&self) -> DispatchState {
        match self.session().as_deref().map(|session| &session.route) {
            Some(Route::Queued(pipeline)) => pipeline.dispatch_state(),
            _ => DispatchState::Idle,
        }
    }

    /// State of the file writer, if file-backed.
    pub fn writer_state(&self) -> Option<WriterState> {
        match self.session().as_deref().map(|session| &session.route) {
            Some(Route::Queued(pipeline)) => Some(pipeline.writer_state()),
            _ => None,
        }
    }

    /// Events dropped because file logging was unavailable and no console
    /// fallback was configured.
    pub fn dropped(&self) -> u64 {
        match self.session().as_deref().map(|session| &session.route) {
            Some(Route::Queued(pipeline)) => pipeline.dropped(),
            _ => 0,
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session();
        f.debug_struct("Logger")
            .field("initialized", &session.is_some())
            .field(
                "destination",
                &session.as_ref().map(|session| session.config.destination),
            )
            .finish_non_exhaustive()
    }
}
