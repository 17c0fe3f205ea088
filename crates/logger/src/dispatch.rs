//! The drain loop and the file pipeline built around it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::rotation::{RotationManager, archive_path};
use crate::{Config, Console, DestinationWriter, PendingQueue, Result, Sink, WriterState};

/// What the drain loop is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchState {
    /// No drain loop is scheduled.
    #[default]
    Idle,
    /// Scheduled; waiting for the next tick.
    Waiting,
    /// A pass is moving lines into the writer.
    Draining,
}

/// Moves queued lines into the writer, one pass per tick.
pub(crate) struct Dispatcher<S: Sink> {
    queue: Arc<PendingQueue>,
    writer: Arc<Mutex<DestinationWriter<S>>>,
    rotation_pending: Arc<AtomicBool>,
    fallback: Option<Arc<dyn Console>>,
    dropped: Arc<AtomicU64>,
    state: Arc<watch::Sender<DispatchState>>,
}

impl<S: Sink> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            writer: self.writer.clone(),
            rotation_pending: self.rotation_pending.clone(),
            fallback: self.fallback.clone(),
            dropped: self.dropped.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: Sink> Dispatcher<S> {
    pub(crate) fn new(
        writer: DestinationWriter<S>,
        fallback: Option<Arc<dyn Console>>,
    ) -> (Self, watch::Receiver<DispatchState>) {
        let (state, receiver) = watch::channel(DispatchState::Idle);

        let dispatcher = Self {
            queue: Arc::new(PendingQueue::new()),
            writer: Arc::new(Mutex::new(writer)),
            rotation_pending: Arc::new(AtomicBool::new(false)),
            fallback,
            dropped: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
        };

        (dispatcher, receiver)
    }

    /// One drain pass.
    ///
    /// Lines are popped until the queue is empty or the writer pushes back.
    /// The line that hits the high-water mark is the last one of the pass,
    /// and a line refused by a writer with no open stream goes back to the
    /// front of the queue. Rotation is performed after the buffer has been
    /// drained.
    pub(crate) async fn pass(&self) {
        self.state.send_replace(DispatchState::Draining);

        let mut writer = self.writer.lock().await;
        writer.retry_if_due().await;

        while let Some(line) = self.queue.pop() {
            match writer.write(line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(line) => {
                    self.queue.requeue(line);
                    break;
                }
            }
        }

        writer.drain().await;

        if self.rotation_pending.swap(false, Ordering::SeqCst) {
            let archive = archive_path(writer.location(), &Local::now());
            writer.rotate(&archive).await;
        }

        if writer.state() == WriterState::Disabled {
            let unwritten = writer.take_unwritten();
            drop(writer);
            self.divert(unwritten);
            self.divert(self.queue.take_all());
        }

        self.state.send_replace(DispatchState::Waiting);
    }

    /// Runs a pass every `period` until `shutdown` is cancelled.
    ///
    /// A pass in flight when `shutdown` fires is finished first.
    pub(crate) async fn run(self, period: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.state.send_replace(DispatchState::Waiting);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => self.pass().await,
            }
        }

        self.state.send_replace(DispatchState::Idle);
        debug!("drain loop stopped");
    }

    /// Writes every queued line regardless of backpressure, then closes the
    /// writer. Lines that still cannot be written are diverted.
    pub(crate) async fn flush_all(&self) {
        let mut writer = self.writer.lock().await;
        writer.retry_now().await;

        let mut rejected = Vec::new();
        for line in self.queue.take_all() {
            if let Err(line) = writer.write(line) {
                rejected.push(line);
            }
        }

        let mut unwritten = writer.close().await;
        drop(writer);

        unwritten.append(&mut rejected);
        self.divert(unwritten);
    }

    /// Hands lines that cannot reach the file to the fallback console, or
    /// counts them as dropped.
    fn divert(&self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }

        if let Some(console) = &self.fallback {
            for line in &lines {
                console.emit(line);
            }
            return;
        }

        let count = lines.len() as u64;
        let before = self.dropped.fetch_add(count, Ordering::Relaxed);
        if before == 0 {
            warn!(count, "file logging unavailable; dropping events");
        } else {
            debug!(count, total = before + count, "dropping events");
        }
    }
}

/// Type-erased queue-and-drain machinery behind a file-backed logger.
#[async_trait]
pub(crate) trait Pipeline: Send + Sync {
    /// Appends a rendered line.
    fn enqueue(&self, line: String);

    /// Respawns the drain loop if it is no longer running.
    fn ensure_scheduled(&self);

    /// Lines waiting in the queue.
    fn pending(&self) -> usize;

    /// Current drain loop state.
    fn dispatch_state(&self) -> DispatchState;

    /// Current writer state.
    fn writer_state(&self) -> WriterState;

    /// Events that could not be written and had no fallback.
    fn dropped(&self) -> u64;

    /// Stops the timers, flushes everything and closes the writer.
    async fn shutdown(&self) -> Result<()>;
}

/// [`Pipeline`] over a concrete [`Sink`].
pub(crate) struct FilePipeline<S: Sink> {
    dispatcher: Dispatcher<S>,
    period: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    runtime: Handle,
    drain_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    dispatch_status: watch::Receiver<DispatchState>,
    writer_status: watch::Receiver<WriterState>,
}

impl<S: Sink> FilePipeline<S> {
    /// Opens `sink` and starts the drain loop, plus the rotation manager if
    /// `config` asks for rotation.
    ///
    /// Must be called from within a tokio runtime; later respawns use the
    /// same runtime.
    pub(crate) async fn start(
        sink: S,
        config: &Config,
        fallback: Option<Arc<dyn Console>>,
    ) -> Self {
        let mut writer =
            DestinationWriter::new(sink, config.write_buffer_bytes, config.retry_policy());
        writer.open().await;

        let probe = writer.probe();
        let writer_status = writer.subscribe();
        let (dispatcher, dispatch_status) = Dispatcher::new(writer, fallback);

        let pipeline = Self {
            dispatcher,
            period: config.drain_period(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            runtime: Handle::current(),
            drain_task: parking_lot::Mutex::new(None),
            dispatch_status,
            writer_status,
        };

        *pipeline.drain_task.lock() = Some(pipeline.spawn_drain());

        if let Some(ceiling) = config.rotation_ceiling() {
            let manager = RotationManager::new(
                probe,
                ceiling,
                config.rotation_check_period(),
                pipeline.dispatcher.rotation_pending.clone(),
            );
            pipeline
                .tracker
                .spawn_on(manager.run(pipeline.shutdown.clone()), &pipeline.runtime);
        }

        pipeline
    }

    fn spawn_drain(&self) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        self.tracker.spawn_on(
            dispatcher.run(self.period, self.shutdown.clone()),
            &self.runtime,
        )
    }
}

#[async_trait]
impl<S: Sink> Pipeline for FilePipeline<S> {
    fn enqueue(&self, line: String) {
        self.dispatcher.queue.push(line);
    }

    fn ensure_scheduled(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let mut task = self.drain_task.lock();
        if task.as_ref().is_none_or(JoinHandle::is_finished) {
            // Should not happen: the loop only exits on shutdown.
            warn!("drain loop is not running; rescheduling");
            *task = Some(self.spawn_drain());
        }
    }

    fn pending(&self) -> usize {
        self.dispatcher.queue.len()
    }

    fn dispatch_state(&self) -> DispatchState {
        *self.dispatch_status.borrow()
    }

    fn writer_state(&self) -> WriterState {
        *self.writer_status.borrow()
    }

    fn dropped(&self) -> u64 {
        self.dispatcher.dropped.load(Ordering::Relaxed)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.tracker.close();

        let task = self.drain_task.lock().take();
        let mut result = Ok(());
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "drain loop failed");
                result = Err(e.into());
            }
        }
        self.tracker.wait().await;

        self.dispatcher.flush_all().await;

        result
    }
}
