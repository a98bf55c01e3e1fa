//! Contract Tests for Shell Sessions
//!
//! Open, sequential execution and close against scripted transports.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use fleetshell::error::Error;
use fleetshell::models::Credentials;
use fleetshell::session::{
    CaptureStrategy, ConnectTarget, FixedDelay, IdleTimeout, ShellSession,
};
use test_utils::{HostBehaviour, MockConnector};

fn target(address: &str) -> ConnectTarget {
    ConnectTarget::from_credentials(&Credentials::new(address, "admin", "pw"), 22)
}

fn fixed() -> Arc<dyn CaptureStrategy> {
    Arc::new(FixedDelay::new(Duration::from_millis(50)))
}

#[tokio::test(start_paused = true)]
async fn test_open_and_close() {
    let connector = MockConnector::new();
    let mut session = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(session.is_open());
    assert_eq!(session.address(), "10.0.0.1:22");
    session.close().await.unwrap();
    assert!(!session.is_open());
    // Closing again is a no-op
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_open_honours_address_port() {
    let connector = MockConnector::new();
    let session = ShellSession::open(&connector, &target("10.0.0.1:2222"), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(session.address(), "10.0.0.1:2222");
    assert_eq!(connector.connects(), vec!["10.0.0.1"]);
}

#[tokio::test(start_paused = true)]
async fn test_open_failures() {
    let connector = MockConnector::new()
        .with_host("10.0.0.1", HostBehaviour::Unreachable)
        .with_host("10.0.0.2", HostBehaviour::Hang);

    let err = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectFailed { .. }));

    let err = ShellSession::open(&connector, &target("10.0.0.2"), Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout { timeout, .. } if timeout == Duration::from_secs(10)));
}

#[tokio::test(start_paused = true)]
async fn test_nothing_is_sent_until_polled() {
    let connector = MockConnector::new();
    let mut session = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap();
    let commands = vec!["show version".to_string(), "show clock".to_string()];

    let mut run = session.run_sequential(&commands, fixed(), 65535);
    assert!(connector.sent().is_empty());

    let first = run.next().await.unwrap().unwrap();
    assert_eq!(first.output, "OK\n");
    assert_eq!(connector.sent_to("10.0.0.1"), vec!["show version\n"]);

    run.next().await.unwrap().unwrap();
    assert!(run.next().await.is_none());
    assert!(run.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failure_ends_the_run() {
    let connector = MockConnector::new().with_host(
        "10.0.0.1",
        HostBehaviour::DropAfter {
            reply: b"ok\n".to_vec(),
            commands: 1,
        },
    );
    let mut session = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap();
    let commands: Vec<String> = ["a", "b", "c"].iter().map(|c| c.to_string()).collect();

    let mut run = session.run_sequential(&commands, fixed(), 65535);
    assert!(run.next().await.unwrap().is_ok());
    assert!(matches!(run.next().await, Some(Err(Error::ChannelClosed))));
    assert!(run.next().await.is_none());
    assert_eq!(run.sent(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_limit_carries_overflow_to_next_command() {
    let connector =
        MockConnector::new().with_host("10.0.0.1", HostBehaviour::Reply(b"0123456789".to_vec()));
    let mut session = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap();
    let commands = vec!["a".to_string(), "b".to_string()];

    let mut run = session.run_sequential(&commands, fixed(), 6);
    let first = run.next().await.unwrap().unwrap();
    assert_eq!(first.output, "012345");
    assert_eq!(first.raw_len, 6);

    let second = run.next().await.unwrap().unwrap();
    assert_eq!(second.output, "678901");
}

#[tokio::test(start_paused = true)]
async fn test_echoing_shell_with_idle_capture() {
    let connector =
        MockConnector::new().with_host("10.0.0.1", HostBehaviour::Echo(b"R1#".to_vec()));
    let mut session = ShellSession::open(&connector, &target("10.0.0.1"), Duration::from_secs(10))
        .await
        .unwrap();
    let commands = vec!["show ip int brief".to_string()];
    let capture: Arc<dyn CaptureStrategy> = Arc::new(IdleTimeout::new(
        Duration::from_millis(200),
        Duration::from_secs(5),
    ));

    let mut run = session.run_sequential(&commands, capture, 65535);
    let output = run.next().await.unwrap().unwrap();
    assert_eq!(output.command, "show ip int brief");
    assert_eq!(output.output, "show ip int brief\nR1#");
}
