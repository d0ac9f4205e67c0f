use crate::support::*;
use cms_migrate::{BackendSettings, ExecutionRecord};
use std::time::Duration;

fn record(name: &str, operation: Operation) -> ExecutionRecord {
    ExecutionRecord {
        name: name.to_string(),
        order: 1u32.into(),
        success: true,
        time: utc(2024, 5, 1, 9),
        last_operation: operation,
    }
}

#[tokio::test]
async fn status_file_is_indented_json_keyed_by_environment() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = StatusStore::file(&path);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1]));

    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("{\n  \""));
    let json: Value = serde_json::from_str(&raw).unwrap();
    let entry = &json[ENV][0];
    assert_eq!(entry["name"], "01.toml");
    assert_eq!(entry["order"], 1);
    assert_eq!(entry["success"], true);
    assert_eq!(entry["lastOperation"], "run");
    assert!(entry["time"].is_string());
}

#[test]
fn upsert_keeps_one_record_per_name() {
    let mut ledger = StatusLedger::new();
    ledger.upsert(ENV, record("01.toml", Operation::Run));
    ledger.upsert(ENV, record("02.toml", Operation::Run));
    ledger.upsert(ENV, record("01.toml", Operation::Rollback));

    let records = ledger.records(ENV);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].last_operation, Operation::Rollback);
    assert!(ledger.should_skip(ENV, "01.toml", Operation::Rollback));
    assert!(!ledger.should_skip(ENV, "01.toml", Operation::Run));
}

#[test]
fn records_without_last_operation_default_to_run() {
    let text = r#"{"env":[{"name":"01.toml","order":1,"success":true,"time":"2024-05-01T09:00:00Z"}]}"#;
    let ledger = StatusLedger::from_json(text).unwrap();
    assert!(ledger.should_skip("env", "01.toml", Operation::Run));
}

#[tokio::test]
async fn plugin_backend_receives_the_ledger() {
    let memory = MemoryBackend::default();
    let store = StatusStore::with_plugin(memory.clone(), "unused-status.json");
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2]));

    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(store.backend_name(), "memory");
    assert_eq!(memory.ledger().records(ENV).len(), 2);
}

#[tokio::test]
async fn failing_plugin_falls_back_to_the_status_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = StatusStore::with_plugin(FailingBackend, &path);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1]));

    let report = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    let saved = StatusLedger::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(saved.should_skip(ENV, "01.toml", Operation::Run));
}

#[tokio::test]
async fn malformed_backend_settings_are_rejected() {
    let temp = TempDir::new().unwrap();
    let settings: BackendSettings = toml::from_str("backend = \"dynamo\"").unwrap();

    let err = settings.open(temp.path()).await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedBackend { .. }));
}

#[tokio::test]
async fn unreachable_redis_does_not_block_the_run() {
    let temp = TempDir::new().unwrap();
    let settings = BackendSettings {
        backend: "redis".to_string(),
        url: Some("redis://127.0.0.1:1".to_string()),
        ..Default::default()
    };

    let store = tokio::time::timeout(Duration::from_secs(30), settings.open(temp.path()))
        .await
        .expect("opening the store should give up on a closed port")
        .unwrap();
    assert_eq!(store.backend_name(), "redis");

    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2]));
    let report = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(calls(&log), vec!["run:1", "run:2"]);
    let saved = StatusLedger::from_json(&std::fs::read_to_string(temp.path().join("status.json")).unwrap()).unwrap();
    assert_eq!(saved.records(ENV).len(), 2);
}

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn redis_backend_round_trip() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let temp = TempDir::new().unwrap();
    let settings = BackendSettings {
        backend: "redis".to_string(),
        url: Some(url),
        key: "cms-migrate:test-status".to_string(),
        ..Default::default()
    };
    let store = settings.open(temp.path()).await.unwrap();

    let mut ledger = StatusLedger::new();
    ledger.upsert(ENV, record("01.toml", Operation::Run));
    store.persist(&ledger.to_json().unwrap()).await.unwrap();

    assert_eq!(store.backend_name(), "redis");
    assert_eq!(store.load().await.unwrap(), ledger);
}
