//! Integration Tests for Execution Flows
//!
//! Full batches against mock shells, writing real result artifacts.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fleetshell::events::{ProgressEvent, RecordingReporter};
use fleetshell::models::DeviceOutcome;
use fleetshell::orchestrator::{ExecutionSettings, MergePolicy};
use fleetshell::sink::{ArtifactLayout, ArtifactStore, MemorySink};
use test_utils::fixtures::fast_orchestrator_with;
use test_utils::{catalog_from_csv, fast_orchestrator, read_artifact, HostBehaviour, MockConnector};

#[tokio::test]
async fn test_single_device_result_artifact() {
    let temp = TempDir::new().unwrap();
    let catalog = catalog_from_csv("设备名称,IP地址,账号,密码,命令1\nSW1,10.0.0.1,admin,pw,show version\n");
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());
    let orchestrator = fast_orchestrator(Arc::new(MockConnector::new()));

    let summary = orchestrator
        .execute(&catalog, &store, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome("SW1"), Some(&DeviceOutcome::Completed { commands: 1 }));
    let content = read_artifact(&temp.path().join("SW1_result.log"));
    assert_eq!(
        content,
        format!(
            "===============Command: show version===============\nOK\n\n{}\n",
            "=".repeat(50)
        )
    );
}

#[tokio::test]
async fn test_connect_failure_does_not_stop_later_devices() {
    let temp = TempDir::new().unwrap();
    let catalog = catalog_from_csv(
        "设备名称,IP地址,账号,密码,命令1\n\
         A,10.0.0.1,admin,pw,show version\n\
         B,10.0.0.2,admin,pw,show version\n",
    );
    let connector =
        Arc::new(MockConnector::new().with_host("10.0.0.1", HostBehaviour::Unreachable));
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());
    let progress = RecordingReporter::new();

    let summary = fast_orchestrator(connector.clone())
        .execute(&catalog, &store, &progress, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(summary.outcome("A"), Some(DeviceOutcome::ConnectFailed { .. })));
    assert_eq!(summary.outcome("B"), Some(&DeviceOutcome::Completed { commands: 1 }));
    assert_eq!(connector.connects(), vec!["10.0.0.1", "10.0.0.2"]);

    assert!(!temp.path().join("A_result.log").exists());
    assert!(read_artifact(&temp.path().join("B_result.log")).contains("Command: show version"));

    let finished: Vec<String> = progress
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::DeviceFinished { device, .. } => Some(device),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec!["A", "B"]);
}

#[tokio::test]
async fn test_mid_sequence_failure_keeps_completed_pairs() {
    let temp = TempDir::new().unwrap();
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1,c2,c3,c4,c5\n\
         SW1,10.0.0.1,admin,pw,one,two,three,four,five\n",
    );
    let connector = Arc::new(MockConnector::new().with_host(
        "10.0.0.1",
        HostBehaviour::DropAfter {
            reply: b"done\n".to_vec(),
            commands: 2,
        },
    ));
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());

    let summary = fast_orchestrator(connector)
        .execute(&catalog, &store, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    match summary.outcome("SW1") {
        Some(DeviceOutcome::Partial { completed, .. }) => assert_eq!(*completed, 2),
        other => panic!("unexpected outcome {:?}", other),
    }
    let content = read_artifact(&temp.path().join("SW1_result.log"));
    assert_eq!(content.matches("Command: ").count(), 2);
    assert!(content.contains("Command: one"));
    assert!(content.contains("Command: two"));
    assert!(!content.contains("Command: three"));
}

#[tokio::test]
async fn test_blank_commands_never_sent() {
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1,c2,c3\n\
         SW1,10.0.0.1,admin,pw,show version,   ,show clock\n",
    );
    let connector = Arc::new(MockConnector::new());
    let sink = MemorySink::new();

    fast_orchestrator(connector.clone())
        .execute(&catalog, &sink, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        connector.sent_to("10.0.0.1"),
        vec!["show version\n", "show clock\n"]
    );
    let commands: Vec<String> = sink
        .results("SW1")
        .unwrap()
        .into_iter()
        .map(|o| o.command)
        .collect();
    assert_eq!(commands, vec!["show version", "show clock"]);
}

#[tokio::test]
async fn test_invalid_bytes_are_substituted() {
    let temp = TempDir::new().unwrap();
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1\nSW1,10.0.0.1,admin,pw,show version\n",
    );
    let connector = Arc::new(
        MockConnector::new().with_host("10.0.0.1", HostBehaviour::Reply(b"ok \xff\xfe end\n".to_vec())),
    );
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());
    let progress = RecordingReporter::new();

    let summary = fast_orchestrator(connector)
        .execute(&catalog, &store, &progress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome("SW1"), Some(&DeviceOutcome::Completed { commands: 1 }));
    let content = read_artifact(&temp.path().join("SW1_result.log"));
    assert!(content.contains("ok \u{fffd}\u{fffd} end"));
    assert!(progress
        .events()
        .iter()
        .any(|e| matches!(e, ProgressEvent::DecodeWarning { device, .. } if device == "SW1")));
}

#[tokio::test]
async fn test_multi_row_device_merge_policies() {
    let csv = "device name,address,username,password,c1\n\
               SW1,10.0.0.1,admin,pw,show version\n\
               SW1,10.0.0.1,admin,pw,show clock\n";

    let connector = Arc::new(MockConnector::new());
    fast_orchestrator(connector.clone())
        .execute(
            &catalog_from_csv(csv),
            &MemorySink::new(),
            &RecordingReporter::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        connector.sent_to("10.0.0.1"),
        vec!["show version\n", "show clock\n"]
    );

    let connector = Arc::new(MockConnector::new());
    let settings = ExecutionSettings {
        merge_policy: MergePolicy::LastRow,
        ..ExecutionSettings::default()
    };
    fast_orchestrator_with(connector.clone(), settings)
        .execute(
            &catalog_from_csv(csv),
            &MemorySink::new(),
            &RecordingReporter::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(connector.sent_to("10.0.0.1"), vec!["show clock\n"]);
}

#[tokio::test]
async fn test_concurrent_devices_keep_catalog_order_and_command_order() {
    let temp = TempDir::new().unwrap();
    let mut csv = String::from("device name,address,username,password,c1,c2,c3\n");
    for i in 1..=6 {
        csv.push_str(&format!("SW{i},10.0.0.{i},admin,pw,first,second,third\n"));
    }
    let catalog = catalog_from_csv(&csv);
    let connector = Arc::new(MockConnector::new());
    let settings = ExecutionSettings {
        concurrency: 3,
        ..ExecutionSettings::default()
    };
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());

    let summary = fast_orchestrator_with(connector.clone(), settings)
        .execute(&catalog, &store, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = summary.devices.iter().map(|r| r.device.as_str()).collect();
    assert_eq!(order, vec!["SW1", "SW2", "SW3", "SW4", "SW5", "SW6"]);
    assert_eq!(summary.succeeded(), 6);

    for i in 1..=6 {
        assert_eq!(
            connector.sent_to(&format!("10.0.0.{i}")),
            vec!["first\n", "second\n", "third\n"]
        );
        let content = read_artifact(&temp.path().join(format!("SW{i}_result.log")));
        let first = content.find("Command: first").unwrap();
        let second = content.find("Command: second").unwrap();
        let third = content.find("Command: third").unwrap();
        assert!(first < second && second < third);
    }
}

#[tokio::test]
async fn test_cancelled_batch_attempts_no_devices() {
    let catalog = catalog_from_csv(
        "device name,address,username,password,c1\n\
         SW1,10.0.0.1,admin,pw,show version\n\
         SW2,10.0.0.2,admin,pw,show version\n",
    );
    let connector = Arc::new(MockConnector::new());
    let token = CancellationToken::new();
    token.cancel();

    let summary = fast_orchestrator(connector.clone())
        .execute(&catalog, &MemorySink::new(), &RecordingReporter::new(), token)
        .await
        .unwrap();

    assert!(connector.connects().is_empty());
    assert_eq!(summary.failed(), 2);
}

#[tokio::test]
async fn test_colliding_device_names_keep_separate_transcripts() {
    let temp = TempDir::new().unwrap();
    let catalog = catalog_from_csv(
        "设备名称,IP地址,账号,密码,命令1\n\
         core/1,10.0.0.1,admin,pw,show a\n\
         core:1,10.0.0.2,admin,pw,show b\n",
    );
    let store = ArtifactStore::new(temp.path(), ArtifactLayout::default());
    store.reserve(catalog.device_names());

    let summary = fast_orchestrator(Arc::new(MockConnector::new()))
        .execute(&catalog, &store, &RecordingReporter::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded(), 2);
    let first = read_artifact(&temp.path().join("core_1_result.log"));
    let second = read_artifact(&temp.path().join("core_1_2_result.log"));
    assert!(first.contains("Command: show a") && !first.contains("show b"));
    assert!(second.contains("Command: show b") && !second.contains("show a"));
}
