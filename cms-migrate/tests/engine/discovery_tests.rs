use crate::support::*;
use cms_migrate::{DirectorySource, MigrationSource};
use std::path::Path;

const INIT: &str = r#"
order = 1
description = "Article type"

[[run]]
method = "POST"
path = "types"
body = { codename = "article", name = "Article" }

[[rollback]]
method = "DELETE"
path = "types/codename/article"
"#;

const TAXONOMY: &str = r#"
order = 2

[[run]]
method = "POST"
path = "taxonomies"

[[run]]
method = "PATCH"
path = "types/codename/article"
"#;

const DATED: &str = r#"
order = 2023-03-25T10:00:00Z

[[run]]
method = "PUT"
path = "languages/codename/de"
"#;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("Migrations");
    std::fs::create_dir(&dir).unwrap();
    write(&dir, "03_dated.toml", DATED);
    write(&dir, "01_init.toml", INIT);
    write(&dir, "02_taxonomy.toml", TAXONOMY);
    write(&dir, "notes.md", "not a migration");
    temp
}

#[tokio::test]
async fn directory_batch_executes_steps_in_order() {
    let temp = project();
    let source = DirectorySource::new(temp.path().join("Migrations"));
    let store = StatusStore::file(temp.path().join("status.json"));
    let client = RecordingClient::default();

    let report = Orchestrator::new(&source, &client, &store, ENV)
        .run(&RunOptions::new(Selection::All, Operation::Run))
        .await
        .unwrap();

    assert_eq!(report.summary(), "3 of 3 executed");
    assert_eq!(
        calls(&client.log),
        vec![
            "POST types",
            "POST taxonomies",
            "PATCH types/codename/article",
            "PUT languages/codename/de",
        ]
    );

    let ledger = store.load().await.unwrap();
    let dated = ledger.record(ENV, "03_dated.toml").unwrap();
    assert_eq!(dated.order.to_string(), "2023-03-25T10:00:00+00:00");
}

#[tokio::test]
async fn named_unit_resolves_without_extension() {
    let temp = project();
    let source = DirectorySource::new(temp.path().join("Migrations"));
    let store = StatusStore::file(temp.path().join("status.json"));
    let client = RecordingClient::default();

    let rollback = RunOptions::new(Selection::Name("01_init".to_string()), Operation::Rollback);
    let report = Orchestrator::new(&source, &client, &store, ENV)
        .run(&rollback)
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(calls(&client.log), vec!["DELETE types/codename/article"]);
}

#[tokio::test]
async fn batch_rollback_rejects_units_without_rollback_steps() {
    let temp = project();
    let source = DirectorySource::new(temp.path().join("Migrations"));

    let err = source.discover_all(Operation::Rollback).unwrap_err();
    assert!(matches!(err, EngineError::MissingEntryPoint { ref name, .. } if name == "02_taxonomy.toml"));
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp = project();
    let source = DirectorySource::new(temp.path().join("Migrations"));

    assert!(matches!(
        source.select_by_name("notes.md"),
        Err(EngineError::UnsupportedExtension { .. })
    ));
}

#[test]
fn broken_file_fails_the_whole_discovery() {
    let temp = project();
    let dir = temp.path().join("Migrations");
    write(&dir, "04_broken.toml", "order = \n[[run]]");

    let err = DirectorySource::new(&dir).discover_all(Operation::Run).unwrap_err();
    assert!(matches!(err, EngineError::MigrationLoad { .. }));
    assert!(err.to_string().contains("04_broken.toml"));
}

#[test]
fn duplicate_files_are_reported_together() {
    let temp = project();
    let dir = temp.path().join("Migrations");
    write(&dir, "04_again.toml", TAXONOMY);

    let units = DirectorySource::new(&dir).discover_all(Operation::Run).unwrap();
    let err = cms_migrate::discovery::validate_batch(&units).unwrap_err();
    assert_eq!(
        err.to_string(),
        "duplicate migration order found: 02_taxonomy.toml (order: 2), 04_again.toml (order: 2)"
    );
}
