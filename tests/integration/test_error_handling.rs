//! Integration Tests for Error Handling
//!
//! Schema errors stop an operation before any work; device and artifact
//! errors stay scoped to their device.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fleetshell::catalog::{CsvTableSource, DeviceCatalog};
use fleetshell::config::loader::validate_config;
use fleetshell::config::{CaptureConfig, ColumnConfig};
use fleetshell::error::{Error, ErrorKind};
use fleetshell::events::{ProgressEvent, RecordingReporter};
use fleetshell::models::DeviceOutcome;
use fleetshell::script::ScriptCompiler;
use fleetshell::sink::{ArtifactLayout, ArtifactStore, MemorySink};
use fleetshell::Config;
use test_utils::{catalog_from_csv, fast_orchestrator, write_table, HostBehaviour, MockConnector};

#[test]
fn test_missing_device_name_column() {
    let temp = TempDir::new().unwrap();
    let table = write_table(temp.path(), "t.csv", "host,address,cmd\nSW1,10.0.0.1,show version\n");

    let err = DeviceCatalog::load(&CsvTableSource::new(&table), &ColumnConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingColumn { .. }));
    assert_eq!(err.kind(), ErrorKind::Schema);

    // Nothing besides the table itself exists
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn test_unreadable_table() {
    let err = DeviceCatalog::load(
        &CsvTableSource::new("/nonexistent/devices.csv"),
        &ColumnConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::TableReadFailed { .. }));
}

#[tokio::test]
async fn test_execute_without_login_columns_does_no_device_work() {
    let catalog = catalog_from_csv("device name,address,c1\nSW1,10.0.0.1,show version\n");
    let connector = Arc::new(MockConnector::new());
    let progress = RecordingReporter::new();

    let err = fast_orchestrator(connector.clone())
        .execute(&catalog, &MemorySink::new(), &progress, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::LoginColumnsMissing { ref missing } if missing.len() == 2));
    assert!(connector.connects().is_empty());
    let events = progress.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ProgressEvent::BatchError { .. }));
}

#[tokio::test]
async fn test_rejected_login_is_connect_failure() {
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1\n\
         SW1,10.0.0.1,admin,wrong,show version\n\
         SW2,10.0.0.2,admin,pw,show version\n",
    );
    let connector =
        Arc::new(MockConnector::new().with_host("10.0.0.1", HostBehaviour::RejectLogin));

    let summary = fast_orchestrator(connector)
        .execute(&catalog, &MemorySink::new(), &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    match summary.outcome("SW1") {
        Some(DeviceOutcome::ConnectFailed { error }) => assert!(error.contains("admin")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(summary.outcome("SW2").unwrap().is_success());
}

#[tokio::test]
async fn test_blank_credentials_skip_only_that_device() {
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1\n\
         SW1,10.0.0.1,admin,,show version\n\
         SW2,10.0.0.2,admin,pw,show version\n",
    );
    let connector = Arc::new(MockConnector::new());

    let summary = fast_orchestrator(connector.clone())
        .execute(&catalog, &MemorySink::new(), &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(summary.outcome("SW1"), Some(DeviceOutcome::Skipped { .. })));
    assert_eq!(connector.connects(), vec!["10.0.0.2"]);
}

#[tokio::test]
async fn test_unwritable_output_is_device_scoped() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("out");
    std::fs::write(&blocker, "not a directory").unwrap();

    let catalog = catalog_from_csv(
        "device name,address,username,password,c1\n\
         SW1,10.0.0.1,admin,pw,show version\n\
         SW2,10.0.0.2,admin,pw,show version\n",
    );
    let store = ArtifactStore::new(&blocker, ArtifactLayout::default());

    let compiled = ScriptCompiler::default()
        .compile_all(&catalog, &store, &RecordingReporter::new())
        .await;
    assert_eq!(compiled.failed.len(), 2);

    let connector = Arc::new(MockConnector::new());
    let summary = fast_orchestrator(connector.clone())
        .execute(&catalog, &store, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(summary.outcome("SW1"), Some(DeviceOutcome::WriteFailed { completed: 0, .. })));
    assert!(matches!(summary.outcome("SW2"), Some(DeviceOutcome::WriteFailed { .. })));
    // Both devices were still attempted
    assert_eq!(connector.connects().len(), 2);
}

#[test]
fn test_invalid_configuration_values() {
    let mut config = Config::default();
    config.script.delimiter = String::new();
    assert!(matches!(
        validate_config(&config),
        Err(Error::ConfigValidationFailed { ref field, .. }) if field == "script.delimiter"
    ));

    let mut config = Config::default();
    config.session.capture = CaptureConfig::PromptMatch {
        pattern: "(".to_string(),
        poll_ms: 100,
        max_wait_ms: 1000,
    };
    let err = validate_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
