//! File destination against the real file system

use std::collections::BTreeMap;
use std::path::Path;

use fifolog::{Config, Level, Logger, WriterState};
use serde_json::{Value, json};
use tempfile::tempdir;

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_severity_filter_drops_below_minimum() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    let logger = Logger::new();

    logger
        .init(
            Config::builder()
                .min_level(Level::Warning)
                .file(&path)
                .build(),
        )
        .await;
    logger.info("x", &[]);
    logger.error("y", &[]);
    logger.close().await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("[error]"));
    assert!(lines[0].contains("[y]"));
}

#[tokio::test]
async fn test_lines_are_written_in_call_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fifo.log");
    let logger = Logger::new();
    logger
        .init(Config::builder().json(true).file(&path).build())
        .await;

    for i in 0..500 {
        logger.log(Level::from(i8::try_from(i % 4).unwrap()), i.to_string(), &[]);
        if i % 100 == 0 {
            tokio::task::yield_now().await;
        }
    }
    logger.close().await.unwrap();

    let messages: Vec<String> = read_lines(&path)
        .iter()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            value["message"].as_str().unwrap().to_string()
        })
        .collect();
    let expected: Vec<String> = (0..500).map(|i: i32| i.to_string()).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn test_json_lines_have_exact_shape() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("json.log");
    let logger = Logger::new();
    logger
        .init(
            Config::builder()
                .prefix("YourAppName")
                .min_level(Level::Debug)
                .json(true)
                .file(&path)
                .build(),
        )
        .await;

    logger.debug("d", &[]);
    logger.info("Processing started for file", &[json!({ "filename": "data.csv" })]);
    logger.warn("w", &[json!(1), json!("two")]);
    logger.error("Error processing record", &[json!({ "recordId": 45 })]);
    logger.critical("c", &[]);
    logger.close().await.unwrap();

    let names: Vec<&str> = Level::ALL.iter().map(|level| level.as_str()).collect();
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 5);

    for line in &lines {
        let object: BTreeMap<String, Value> = serde_json::from_str(line).unwrap();
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["date", "message", "name", "optionalParams", "severity"]);
        assert_eq!(object["name"], "YourAppName");
        assert!(names.contains(&object["severity"].as_str().unwrap()));
        assert!(object["optionalParams"].is_array());
    }

    let warn: Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(warn["severity"], "warning");
    assert_eq!(warn["optionalParams"], json!([1, "two"]));
}

#[tokio::test]
async fn test_truncation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trunc.log");
    let logger = Logger::new();
    logger
        .init(Config::builder().max_event_length(20).file(&path).build())
        .await;

    logger.info("a message that is definitely longer than twenty characters", &[]);
    logger.close().await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].chars().count(), 23);
    assert!(lines[0].ends_with("..."));
}

#[tokio::test]
async fn test_appends_to_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.log");
    std::fs::write(&path, "earlier run\n").unwrap();

    let logger = Logger::new();
    logger.init(Config::builder().file(&path).build()).await;
    logger.info("this run", &[]);
    logger.close().await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "earlier run");
    assert!(lines[1].contains("[this run]"));
}

#[tokio::test]
async fn test_close_flushes_before_first_drain_tick() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("slow.log");
    let logger = Logger::new();
    logger
        .init(
            Config::builder()
                .drain_period(Config::DRAIN_SLOW)
                .file(&path)
                .build(),
        )
        .await;

    for i in 0..10 {
        logger.info(format!("event {i}"), &[]);
    }
    assert_eq!(logger.pending(), 10);

    logger.close().await.unwrap();

    assert_eq!(read_lines(&path).len(), 10);
    assert!(!logger.is_initialized());
    assert_eq!(logger.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_callers_keep_their_own_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("threads.log");
    let logger = Logger::new();
    logger
        .init(Config::builder().json(true).file(&path).build())
        .await;

    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let logger = logger.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    logger.info(format!("{thread}:{i}"), &[]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().await.unwrap();

    let messages: Vec<String> = read_lines(&path)
        .iter()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            value["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(messages.len(), 1000);

    for thread in 0..4 {
        let seen: Vec<usize> = messages
            .iter()
            .filter_map(|message| message.strip_prefix(&format!("{thread}:")))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..250).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_unwritable_path_never_fails_the_caller() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("app.log");
    let logger = Logger::new();

    logger.init(Config::builder().file(&path).build()).await;
    assert!(matches!(
        logger.writer_state(),
        Some(WriterState::Retrying { attempt: 1, .. })
    ));

    logger.error("nowhere to go", &[]);
    logger.close().await.unwrap();

    assert!(!path.exists());
}
