//! Demonstration driver for the fifolog engine.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fifolog::{Config, Level, Logger};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Logger error
    #[error(transparent)]
    Logger(#[from] fifolog::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Args)]
struct Common {
    /// Name written at the start of every event
    #[arg(long, default_value = "", env = "FIFOLOG_PREFIX", global = true)]
    prefix: String,

    /// Minimum severity (debug, info, warning, error, critical)
    #[arg(long, default_value = "info", env = "FIFOLOG_MIN_LEVEL", global = true)]
    min_level: Level,

    /// Truncate rendered events to this many characters (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "FIFOLOG_MAX_EVENT_LENGTH", global = true)]
    max_event_length: usize,

    /// Drain loop period in milliseconds
    #[arg(long, default_value_t = 100, env = "FIFOLOG_DRAIN_PERIOD_MS", global = true)]
    drain_period_ms: u64,

    /// Render events as JSON
    #[arg(long, env = "FIFOLOG_JSON", global = true)]
    json: bool,

    /// Disable ANSI colors on the console
    #[arg(long, env = "FIFOLOG_NO_COLOR", global = true)]
    no_color: bool,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// A handful of console events at each severity
    Simple,

    /// Many console events, one per millisecond
    Burst {
        /// Number of events
        #[arg(long, default_value_t = 1000)]
        count: usize,
    },

    /// A few events to a file, then close
    File {
        /// Log file path
        #[arg(long, default_value = "/tmp/fifolog.log", env = "FIFOLOG_PATH")]
        path: PathBuf,
    },

    /// Log to a rotating file until interrupted
    Soak {
        /// Log file path
        #[arg(long, default_value = "/tmp/fifolog-soak.log", env = "FIFOLOG_PATH")]
        path: PathBuf,

        /// Rotation ceiling in megabytes
        #[arg(long, default_value_t = 1)]
        rotate_size_mb: u64,

        /// Interval between rotation checks in milliseconds
        #[arg(long, default_value_t = 10_000)]
        rotation_check_ms: u64,

        /// Delay between events in milliseconds
        #[arg(long, default_value_t = 1)]
        interval_ms: u64,
    },
}

impl Common {
    fn config(&self) -> fifolog::ConfigBuilder {
        Config::builder()
            .prefix(self.prefix.clone())
            .min_level(self.min_level)
            .max_event_length(self.max_event_length)
            .drain_period(Duration::from_millis(self.drain_period_ms))
            .json(self.json)
            .color(!self.no_color)
    }
}

/// Cycles through every severity above debug.
const fn level_for(i: usize) -> Level {
    Level::ALL[1 + i % 4]
}

async fn simple(logger: &Logger, common: &Common) {
    logger.init(common.config().console().build()).await;

    logger.warn("Simple message without attachments", &[]);
    logger.info("Server started successfully.", &[]);
    logger.debug("Not visible at the default level", &[]);
    logger.warn(
        "Configuration value missing, using default.",
        &[json!({ "userId": 123 })],
    );
    logger.error(
        "Failed to connect to database",
        &[json!("Connection timeout")],
    );
}

async fn burst(logger: &Logger, common: &Common, count: usize) {
    logger.init(common.config().console().build()).await;

    let mut interval = tokio::time::interval(Duration::from_millis(1));
    for i in 0..count {
        interval.tick().await;
        logger.log(
            level_for(i),
            format!("{i} TEST ME UP 1 2 3"),
            &[
                json!({ "alfa": "beta", "apple": 123 }),
                json!(["gamma", "delta", "epsilon"]),
            ],
        );
    }
    info!(count, "all events enqueued");
}

async fn file(logger: &Logger, common: &Common, path: PathBuf) {
    info!(path = %path.display(), "logging to file");
    logger.init(common.config().file(path).build()).await;

    logger.info(
        "Processing started for file",
        &[json!({ "filename": "data.csv" })],
    );
    logger.error(
        "Error processing record",
        &[json!({ "recordId": 45, "error": "Invalid format" })],
    );
}

async fn soak(
    logger: &Logger,
    config: Config,
    interval_ms: u64,
    shutdown: CancellationToken,
) -> u64 {
    logger.init(config).await;

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut written = 0u64;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                logger.log(
                    level_for(usize::try_from(written).unwrap_or_default()),
                    format!("{written} TEST ME UP 1 2 3"),
                    &[json!({ "alfa": "beta", "apple": 123 })],
                );
                written += 1;
            }
        }
    }

    written
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Engine diagnostics (I/O errors, retries, rotation) go through tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let logger = Logger::new();

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt signal");
        signal_shutdown_token.cancel();
    });

    match cli.command {
        Command::Simple => simple(&logger, &cli.common).await,
        Command::Burst { count } => burst(&logger, &cli.common, count).await,
        Command::File { path } => file(&logger, &cli.common, path).await,
        Command::Soak {
            path,
            rotate_size_mb,
            rotation_check_ms,
            interval_ms,
        } => {
            let config = cli
                .common
                .config()
                .file(path)
                .rotate_at_mb(rotate_size_mb)
                .rotation_check_period(Duration::from_millis(rotation_check_ms))
                .build();
            let written = soak(&logger, config, interval_ms, shutdown_token).await;
            info!(written, "soak finished");
        }
    }

    info!("closing logger");
    logger.close().await?;
    info!("logger closed");

    Ok(())
}
