use crate::support::*;

fn store(temp: &TempDir) -> StatusStore {
    StatusStore::file(temp.path().join("status.json"))
}

async fn run_all(source: &StaticSource, store: &StatusStore, operation: Operation) -> cms_migrate::RunReport {
    Orchestrator::new(source, &RecordingClient::default(), store, ENV)
        .run(&RunOptions::new(Selection::All, operation))
        .await
        .unwrap()
}

#[tokio::test]
async fn date_range_selects_inclusive_instants() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();

    let mut source = StaticSource::default();
    for (label, stamp) in [
        ("24", utc(2023, 3, 24, 0)),
        ("27-noon", utc(2023, 3, 27, 12)),
        ("26", utc(2023, 3, 26, 0)),
        ("25", utc(2023, 3, 25, 0)),
        ("27", utc(2023, 3, 27, 0)),
    ] {
        source.push(MigrationUnit::new(format!("{label}.toml"), stamp, RecordingMigration::new(label, &log)));
    }
    source.push(MigrationUnit::new("1.toml", 1u32, RecordingMigration::new("1", &log)));

    let range = MigrationRange::parse("T2023-03-25:2023-03-27").unwrap();
    let report = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Range(range), Operation::Run))
        .await
        .unwrap();

    assert_eq!(calls(&log), vec!["run:25", "run:26", "run:27"]);
    assert_eq!(report.planned, 3);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn numeric_range_ignores_timestamps() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();

    let mut source = StaticSource::new(numbered(&log, &[4, 1, 2, 3]));
    source.push(MigrationUnit::new("ts.toml", utc(2023, 1, 1, 0), RecordingMigration::new("ts", &log)));

    let range = MigrationRange::parse("2:3").unwrap();
    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Range(range), Operation::Run))
        .await
        .unwrap();

    assert_eq!(calls(&log), vec!["run:2", "run:3"]);
}

#[tokio::test]
async fn rollback_runs_newest_first_and_is_skipped_once_done() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[2, 3, 1]));

    run_all(&source, &store, Operation::Run).await;
    let rollback = run_all(&source, &store, Operation::Rollback).await;
    assert_eq!(
        calls(&log),
        vec!["run:1", "run:2", "run:3", "rollback:3", "rollback:2", "rollback:1"]
    );
    assert_eq!(rollback.summary(), "3 of 3 executed");

    let again = run_all(&source, &store, Operation::Rollback).await;
    assert_eq!(again.planned, 0);
    assert_eq!(again.skipped.len(), 3);

    let ledger = store.load().await.unwrap();
    assert!(ledger.records(ENV).iter().all(|r| r.last_operation == Operation::Rollback));
}

#[tokio::test]
async fn rollback_skips_units_already_rolled_back() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2, 3]));

    run_all(&source, &store, Operation::Run).await;
    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Name("02.toml".to_string()), Operation::Rollback))
        .await
        .unwrap();
    log.lock().unwrap().clear();

    let report = run_all(&source, &store, Operation::Rollback).await;

    assert_eq!(report.skipped, vec!["02.toml"]);
    assert_eq!(calls(&log), vec!["rollback:3", "rollback:1"]);
}

#[tokio::test]
async fn executed_units_are_skipped_unless_forced() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let mut source = StaticSource::new(numbered(&log, &[1, 2]));

    run_all(&source, &store, Operation::Run).await;
    source.push(numbered(&log, &[3]).remove(0));

    let second = run_all(&source, &store, Operation::Run).await;
    assert_eq!(second.skipped, vec!["01.toml", "02.toml"]);
    assert_eq!(calls(&log), vec!["run:1", "run:2", "run:3"]);

    let forced = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run).force(true))
        .await
        .unwrap();
    assert!(forced.skipped.is_empty());
    assert_eq!(forced.planned, 3);
    assert_eq!(calls(&log).len(), 6);
}

#[tokio::test]
async fn skip_is_scoped_to_the_environment() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1]));

    run_all(&source, &store, Operation::Run).await;
    Orchestrator::new(&source, &RecordingClient::default(), &store, "other-env")
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(calls(&log), vec!["run:1", "run:1"]);
    let ledger = store.load().await.unwrap();
    assert_eq!(ledger.environments().count(), 2);
}

#[tokio::test]
async fn first_failure_stops_the_batch() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(vec![
        MigrationUnit::new("01.toml", 1u32, RecordingMigration::new("1", &log)),
        MigrationUnit::new("02.toml", 2u32, RecordingMigration::new("2", &log).failing()),
        MigrationUnit::new("03.toml", 3u32, RecordingMigration::new("3", &log)),
    ]);

    let report = run_all(&source, &store, Operation::Run).await;

    assert_eq!(calls(&log), vec!["run:1", "run:2"]);
    assert!(report.stopped_early);
    assert_eq!(report.summary(), "1 of 3 executed");
    assert_eq!(report.exit_code(), 1);

    let failure = report.failures().next().unwrap();
    let detail = failure.outcome.failure().unwrap();
    assert_eq!(failure.name, "02.toml");
    assert_eq!(detail.kind, FailureKind::Remote);
    assert_eq!(detail.error_code, Some(5));

    let ledger = store.load().await.unwrap();
    assert_eq!(ledger.records(ENV).len(), 1);
    assert!(ledger.record(ENV, "02.toml").is_none());
}

#[tokio::test]
async fn continue_on_error_runs_everything_and_still_fails() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(vec![
        MigrationUnit::new("01.toml", 1u32, RecordingMigration::new("1", &log)),
        MigrationUnit::new("02.toml", 2u32, RecordingMigration::new("2", &log).failing()),
        MigrationUnit::new("03.toml", 3u32, RecordingMigration::new("3", &log)),
    ]);

    let report = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run).continue_on_error(true))
        .await
        .unwrap();

    assert_eq!(calls(&log), vec!["run:1", "run:2", "run:3"]);
    assert!(!report.stopped_early);
    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(report.exit_code(), 1);

    let ledger = store.load().await.unwrap();
    assert!(ledger.should_skip(ENV, "01.toml", Operation::Run));
    assert!(ledger.should_skip(ENV, "03.toml", Operation::Run));
    assert!(!ledger.should_skip(ENV, "02.toml", Operation::Run));
}

#[tokio::test]
async fn duplicate_orders_abort_before_execution() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2, 1]));

    let err = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap_err();

    match err {
        EngineError::DuplicateOrder { offenders } => assert_eq!(offenders.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(calls(&log).is_empty());
    assert!(!temp.path().join("status.json").exists());
}

#[tokio::test]
async fn invalid_orders_abort_before_execution() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(vec![
        MigrationUnit::new("01.toml", 1u32, RecordingMigration::new("1", &log)),
        MigrationUnit::new("neg.toml", -4i64, RecordingMigration::new("neg", &log)),
    ]);

    let err = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidOrder { .. }));
    assert!(err.to_string().contains("neg.toml"));
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn batch_rollback_requires_every_unit_to_support_it() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(vec![
        MigrationUnit::new("01.toml", 1u32, RecordingMigration::new("1", &log)),
        MigrationUnit::new("02.toml", 2u32, RecordingMigration::new("2", &log).without_rollback()),
    ]);

    let err = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Rollback))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MissingEntryPoint { .. }));
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn single_unit_without_rollback_fails_without_calls() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(vec![MigrationUnit::new(
        "01.toml",
        1u32,
        RecordingMigration::new("1", &log).without_rollback(),
    )]);

    let report = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Name("01.toml".to_string()), Operation::Rollback))
        .await
        .unwrap();

    let detail = report.executed[0].outcome.failure().unwrap();
    assert_eq!(detail.kind, FailureKind::MissingRollback);
    assert_eq!(report.exit_code(), 1);
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn single_unit_is_executed_even_when_recorded() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2]));
    let options = RunOptions::new(Selection::Name("02.toml".to_string()), Operation::Run);

    for _ in 0..2 {
        Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
            .run(&options)
            .await
            .unwrap();
    }

    assert_eq!(calls(&log), vec!["run:2", "run:2"]);
}

#[tokio::test]
async fn unknown_single_unit_is_an_error() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let source = StaticSource::default();

    let err = Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Name("missing.toml".to_string()), Operation::Run))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MigrationNotFound { .. }));
}

#[tokio::test]
async fn unreadable_status_is_treated_as_empty() {
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1]));
    let store = StatusStore::only(FailingBackend);

    let report = run_all(&source, &store, Operation::Run).await;

    assert_eq!(calls(&log), vec!["run:1"]);
    let detail = report.executed[0].outcome.failure().unwrap();
    assert_eq!(detail.kind, FailureKind::Ledger);
}

#[tokio::test]
async fn hooks_observe_progress() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let log = call_log();
    let source = StaticSource::new(numbered(&log, &[1, 2, 3]));
    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .run(&RunOptions::new(Selection::Name("01.toml".to_string()), Operation::Run))
        .await
        .unwrap();

    let events = call_log();
    let (skips, befores, afters) = (events.clone(), events.clone(), events.clone());
    let hooks = cms_migrate::RunHooks {
        on_skip: Some(Box::new(move |unit: &MigrationUnit| {
            skips.lock().unwrap().push(format!("skip {}", unit.name));
        })),
        before_unit: Some(Box::new(move |unit: &MigrationUnit, position: usize, total: usize| {
            befores.lock().unwrap().push(format!("{position}/{total} {}", unit.name));
        })),
        after_unit: Some(Box::new(move |unit: &cms_migrate::UnitReport| {
            afters.lock().unwrap().push(format!("done {}", unit.name));
        })),
    };

    Orchestrator::new(&source, &RecordingClient::default(), &store, ENV)
        .with_hooks(hooks)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(
        calls(&events),
        vec!["skip 01.toml", "1/2 02.toml", "done 02.toml", "2/2 03.toml", "done 03.toml"]
    );
}
