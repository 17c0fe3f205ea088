//! Size-triggered rotation.
//!
//! The manager only decides *when* to rotate: it stats the live file on its
//! own timer and raises a flag. The dispatch loop consumes the flag between
//! writes and performs the rename, so rotation never races an in-flight write.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Datelike, Timelike};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::SizeProbe;

/// Archive name for `path` rotated at `at`.
///
/// The stamp `_Y_M_D_H_Min_S` (no zero padding, month 1-based) goes before
/// the extension of the file name, or at the end if it has none. A leading
/// dot does not start an extension.
pub fn archive_path<T>(path: &Path, at: &T) -> PathBuf
where
    T: Datelike + Timelike,
{
    let stamp = format!(
        "_{}_{}_{}_{}_{}_{}",
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    );

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let archived = match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{stamp}{}", &name[..dot], &name[dot..]),
        _ => format!("{name}{stamp}"),
    };

    path.with_file_name(OsString::from(archived))
}

/// Watches a file's size and raises a shared flag once it reaches a ceiling.
#[derive(Debug)]
pub struct RotationManager<P: SizeProbe> {
    probe: P,
    ceiling: u64,
    period: Duration,
    pending: Arc<AtomicBool>,
}

impl<P: SizeProbe> RotationManager<P> {
    /// Creates a manager that sets `pending` when `probe` reports at least
    /// `ceiling` bytes.
    pub const fn new(probe: P, ceiling: u64, period: Duration, pending: Arc<AtomicBool>) -> Self {
        Self {
            probe,
            ceiling,
            period,
            pending,
        }
    }

    /// One size check. Returns whether rotation was requested.
    pub async fn check(&self) -> bool {
        match self.probe.size().await {
            Ok(size) if size >= self.ceiling => {
                debug!(size, ceiling = self.ceiling, "log file over size ceiling");
                self.pending.store(true, Ordering::SeqCst);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "error checking log file size; will retry");
                false
            }
        }
    }

    /// Checks once per period until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check().await;
                }
            }
        }

        debug!("rotation manager stopped");
    }
}
