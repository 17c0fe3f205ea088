//! Stream errors, retries and fail-closed behavior

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use fifolog::test_support::{CaptureConsole, MemoryFs};
use fifolog::{Config, Logger, RetryPolicy, WriterState};

const PATH: &str = "/var/log/app.log";

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_write_error_loses_nothing() {
    let fs = MemoryFs::new();
    let logger = Logger::new();
    logger
        .init_with_sink(Config::default(), fs.sink(PATH))
        .await;

    fs.fail_writes(1);
    logger.info("a", &[]);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_matches!(
        logger.writer_state(),
        Some(WriterState::Retrying { attempt: 1, .. })
    );

    logger.info("b", &[]);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(logger.writer_state(), Some(WriterState::Writable));

    let lines = fs.lines(PATH);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[a]"));
    assert!(lines[1].contains("[b]"));

    logger.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_closed() {
    let fs = MemoryFs::new();
    fs.fail_opens(usize::MAX);
    let logger = Logger::new();
    logger
        .init_with_sink(
            Config::builder().retry_policy(fast_retries()).build(),
            fs.sink(PATH),
        )
        .await;

    logger.info("a", &[]);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(logger.writer_state(), Some(WriterState::Disabled));
    assert_eq!(logger.dropped(), 1);

    logger.info("b", &[]);
    logger.info("c", &[]);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(logger.dropped(), 3);
    assert_eq!(logger.pending(), 0);

    // Opening would succeed now, but disabled is final.
    fs.fail_opens(0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(logger.writer_state(), Some(WriterState::Disabled));

    logger.close().await.unwrap();
    assert_eq!(fs.read(PATH), None);
}

#[tokio::test(start_paused = true)]
async fn test_console_fallback_after_disable() {
    let fs = MemoryFs::new();
    fs.fail_opens(usize::MAX);
    let console = CaptureConsole::new();
    let logger = Logger::with_console(Arc::new(console.clone()));
    logger
        .init_with_sink(
            Config::builder()
                .retry_policy(fast_retries())
                .console_fallback(true)
                .build(),
            fs.sink(PATH),
        )
        .await;

    logger.warn("first", &[]);
    logger.warn("second", &[]);
    tokio::time::sleep(Duration::from_millis(250)).await;

    let lines = console.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[first]"));
    assert!(lines[1].contains("[second]"));
    assert_eq!(logger.dropped(), 0);

    logger.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_close_during_retry_reopens_and_flushes() {
    let fs = MemoryFs::new();
    let logger = Logger::new();
    logger
        .init_with_sink(Config::default(), fs.sink(PATH))
        .await;

    fs.fail_writes(1);
    logger.info("kept", &[]);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_matches!(
        logger.writer_state(),
        Some(WriterState::Retrying { .. })
    );

    logger.info("also kept", &[]);
    logger.close().await.unwrap();

    let lines = fs.lines(PATH);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[kept]"));
    assert!(lines[1].contains("[also kept]"));
}
