//! Interactive Shell Sessions
//!
//! A [`ShellSession`] is one authenticated interactive shell on one device.
//! Commands go through it strictly one at a time: send the command and a
//! newline, let the [`CaptureStrategy`] collect the output, hand the
//! [`CommandOutput`] back, then move to the next command.
//!
//! The transport sits behind [`ShellConnector`] and [`ShellChannel`]; the
//! SSH implementation lives in [`ssh`].

pub mod capture;
pub mod host_keys;
pub mod ssh;
pub mod streams;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{CommandOutput, Credentials};
use crate::security_audit;

pub use capture::{CaptureStrategy, FixedDelay, IdleTimeout, PromptMatch};
pub use host_keys::{HostKeyDecision, HostKeyPolicy};
pub use ssh::{RusshConnector, TerminalRequest};
pub use streams::{ShellStreams, StreamStats};

/// An open, interactive shell channel
#[async_trait]
pub trait ShellChannel: Send {
    /// Write raw bytes to the shell
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Take up to `limit` bytes already received, without waiting
    fn read_available(&mut self, limit: usize) -> Result<Vec<u8>>;

    /// Whether the remote side may still produce output
    fn is_open(&self) -> bool;

    /// Close the channel and its connection
    async fn close(&mut self) -> Result<()>;
}

/// Opens authenticated shell channels
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Connect, authenticate and start an interactive shell
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn ShellChannel>>;
}

/// Where and as whom to connect
#[derive(Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl ConnectTarget {
    /// Build a target from credentials; the address may carry its own port
    /// as `host:port` or `[v6]:port`
    pub fn from_credentials(credentials: &Credentials, default_port: u16) -> Self {
        let (host, port) = split_host_port(credentials.address.trim(), default_port);
        Self {
            host,
            port,
            credentials: credentials.clone(),
        }
    }

    /// `host:port` for logs and errors
    pub fn display_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.credentials.username)
            .finish()
    }
}

fn split_host_port(address: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return (host.to_string(), port);
        }
    }

    // A bare IPv6 address has several colons and no port
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        _ => (address.to_string(), default_port),
    }
}

/// One interactive shell on one device
pub struct ShellSession {
    id: Uuid,
    address: String,
    channel: Option<Box<dyn ShellChannel>>,
    opened_at: DateTime<Local>,
    started: Instant,
}

impl ShellSession {
    /// Connect and authenticate within `connect_timeout`
    pub async fn open(
        connector: &dyn ShellConnector,
        target: &ConnectTarget,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let address = target.display_address();
        security_audit::log_ssh_connection(&address, &target.credentials.username);
        debug!("Opening shell session to {} ({:?})", address, target);

        let channel = match tokio::time::timeout(connect_timeout, connector.connect(target)).await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", address, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection to {} timed out after {:?}", address, connect_timeout);
                return Err(Error::ConnectTimeout {
                    address,
                    timeout: connect_timeout,
                });
            }
        };

        let session = Self {
            id: Uuid::new_v4(),
            address,
            channel: Some(channel),
            opened_at: Local::now(),
            started: Instant::now(),
        };
        security_audit::log_ssh_session_start(&session.address);
        info!("Shell session {} open to {}", session.id, session.address);
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `host:port` of the device
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn opened_at(&self) -> DateTime<Local> {
        self.opened_at
    }

    /// Whether the session can still take commands
    pub fn is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// Run `commands` in order, one result per non-blank command
    ///
    /// Results are produced lazily: nothing is sent until
    /// [`CommandRun::next`] is awaited.
    pub fn run_sequential<'a>(
        &'a mut self,
        commands: &'a [String],
        capture: Arc<dyn CaptureStrategy>,
        read_limit: usize,
    ) -> CommandRun<'a> {
        CommandRun {
            session: self,
            commands,
            position: 0,
            capture,
            read_limit,
            cancel: None,
            sent: 0,
            failed: false,
        }
    }

    async fn execute(
        &mut self,
        command: &str,
        capture: &dyn CaptureStrategy,
        read_limit: usize,
    ) -> Result<CommandOutput> {
        let channel = self.channel.as_mut().ok_or(Error::SessionClosed)?;

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        channel.send(&line).await?;
        debug!("Sent '{}' to {}, capturing with {}", command, self.address, capture.name());

        let bytes = capture.capture(&mut **channel, read_limit).await?;
        Ok(CommandOutput::from_bytes(command, &bytes))
    }

    /// Close the channel and connection; closing twice is a no-op
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        let result = channel.close().await;
        security_audit::log_ssh_session_end(&self.address, self.started.elapsed().as_secs());
        info!("Shell session {} to {} closed", self.id, self.address);
        result
    }
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("open", &self.is_open())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// Lazy, ordered execution of a command list on one session
///
/// After the first error the run is over: that error is returned once and
/// every later call yields `None`.
pub struct CommandRun<'a> {
    session: &'a mut ShellSession,
    commands: &'a [String],
    position: usize,
    capture: Arc<dyn CaptureStrategy>,
    read_limit: usize,
    cancel: Option<CancellationToken>,
    sent: usize,
    failed: bool,
}

impl CommandRun<'_> {
    /// Stop before the next command once `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Commands sent so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Execute the next non-blank command
    pub async fn next(&mut self) -> Option<Result<CommandOutput>> {
        if self.failed {
            return None;
        }

        let commands = self.commands;
        let command = loop {
            let raw = commands.get(self.position)?;
            self.position += 1;
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                break trimmed;
            }
        };

        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            self.failed = true;
            return Some(Err(Error::Cancelled));
        }

        self.sent += 1;
        let result = self
            .session
            .execute(command, self.capture.as_ref(), self.read_limit)
            .await;
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
