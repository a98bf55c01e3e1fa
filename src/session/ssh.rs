//! SSH Transport
//!
//! [`RusshConnector`] opens a password-authenticated interactive shell
//! with a pseudo-terminal. Each channel gets a pump task that owns the
//! russh channel: it forwards incoming data into the output queue read by
//! [`ShellStreams`] and performs writes requested by [`SshChannel::send`].

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh::{ChannelMsg, Disconnect};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::host_keys::HostKeyPolicy;
use super::streams::ShellStreams;
use super::{ConnectTarget, ShellChannel, ShellConnector};
use crate::error::{Error, Result};
use crate::security_audit;

/// How long `close` waits for the pump to wind down
const PUMP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Pseudo-terminal requested for the remote shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalRequest {
    /// Terminal type
    pub term: String,
    /// Width in characters
    pub cols: u32,
    /// Height in rows
    pub rows: u32,
}

impl Default for TerminalRequest {
    fn default() -> Self {
        Self {
            term: "vt100".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

/// Connects to devices over SSH with password authentication
#[derive(Debug, Clone)]
pub struct RusshConnector {
    policy: HostKeyPolicy,
    terminal: TerminalRequest,
    config: Arc<client::Config>,
}

impl RusshConnector {
    pub fn new(policy: HostKeyPolicy, terminal: TerminalRequest) -> Self {
        Self {
            policy,
            terminal,
            config: Arc::new(client::Config::default()),
        }
    }

    pub fn policy(&self) -> &HostKeyPolicy {
        &self.policy
    }
}

struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Fingerprint of a key the policy refused
    rejected: Arc<StdMutex<Option<String>>>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let decision = self.policy.check(&self.host, self.port, server_public_key);
        security_audit::log_host_key_decision(
            &self.host,
            &decision.fingerprint,
            self.policy.name(),
            decision.accepted,
            decision.verified,
        );

        if !decision.accepted {
            if let Ok(mut slot) = self.rejected.lock() {
                *slot = Some(decision.fingerprint);
            }
        }
        Ok(decision.accepted)
    }
}

#[async_trait]
impl ShellConnector for RusshConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn ShellChannel>> {
        let address = target.display_address();
        let rejected = Arc::new(StdMutex::new(None));
        let handler = SshHandler {
            host: target.host.clone(),
            port: target.port,
            policy: self.policy.clone(),
            rejected: rejected.clone(),
        };

        let mut handle = match client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            handler,
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                let fingerprint = rejected.lock().ok().and_then(|mut slot| slot.take());
                return Err(match fingerprint {
                    Some(fingerprint) => Error::HostKeyRejected {
                        address,
                        fingerprint,
                    },
                    None => Error::ConnectFailed {
                        address,
                        reason: e.to_string(),
                    },
                });
            }
        };

        let auth = handle
            .authenticate_password(
                target.credentials.username.as_str(),
                target.credentials.password.as_str(),
            )
            .await
            .map_err(|e| Error::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        if !auth.success() {
            return Err(Error::AuthenticationRejected {
                address,
                username: target.credentials.username.clone(),
            });
        }

        let setup_failed = |e: russh::Error| Error::ChannelSetupFailed {
            address: address.clone(),
            reason: e.to_string(),
        };
        let channel = handle.channel_open_session().await.map_err(setup_failed)?;
        channel
            .request_pty(
                false,
                &self.terminal.term,
                self.terminal.cols,
                self.terminal.rows,
                0,
                0,
                &[],
            )
            .await
            .map_err(setup_failed)?;
        channel.request_shell(false).await.map_err(setup_failed)?;
        debug!(
            "Interactive shell on {} ({} {}x{})",
            address, self.terminal.term, self.terminal.cols, self.terminal.rows
        );

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_channel(channel, request_rx, output_tx));

        Ok(Box::new(SshChannel {
            address,
            handle: Some(handle),
            requests: request_tx,
            streams: ShellStreams::from_channel(output_rx),
            pump: Some(pump),
        }))
    }
}

enum PumpRequest {
    Write {
        data: Vec<u8>,
        done: oneshot::Sender<std::result::Result<(), String>>,
    },
    Close,
}

async fn pump_channel(
    mut channel: russh::Channel<client::Msg>,
    mut requests: mpsc::UnboundedReceiver<PumpRequest>,
    output: mpsc::UnboundedSender<Vec<u8>>,
) {
    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    let _ = output.send(data.to_vec());
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    let _ = output.send(data.to_vec());
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
            request = requests.recv() => match request {
                Some(PumpRequest::Write { data, done }) => {
                    let result = channel.data(&data[..]).await.map_err(|e| e.to_string());
                    let _ = done.send(result);
                }
                Some(PumpRequest::Close) | None => {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break;
                }
            },
        }
    }
}

/// An interactive shell over an SSH channel
pub struct SshChannel {
    address: String,
    handle: Option<Handle<SshHandler>>,
    requests: mpsc::UnboundedSender<PumpRequest>,
    streams: ShellStreams,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl ShellChannel for SshChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.requests
            .send(PumpRequest::Write {
                data: data.to_vec(),
                done,
            })
            .map_err(|_| Error::ChannelClosed)?;

        match written.await {
            Ok(Ok(())) => {
                self.streams.record_write(data.len());
                Ok(())
            }
            Ok(Err(reason)) => Err(Error::ChannelWriteFailed { reason }),
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    fn read_available(&mut self, limit: usize) -> Result<Vec<u8>> {
        Ok(self.streams.take_available(limit))
    }

    fn is_open(&self) -> bool {
        !self.requests.is_closed() && !self.streams.is_disconnected()
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.requests.send(PumpRequest::Close);
        if let Some(pump) = self.pump.take() {
            if tokio::time::timeout(PUMP_SHUTDOWN_TIMEOUT, pump).await.is_err() {
                warn!("Channel pump for {} did not stop in time", self.address);
            }
        }

        if let Some(handle) = self.handle.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await?;
        }
        debug!(
            "SSH channel to {} closed ({} bytes read, {} bytes written)",
            self.address,
            self.streams.stats().bytes_read,
            self.streams.stats().bytes_written
        );
        Ok(())
    }
}
