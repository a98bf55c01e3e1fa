//! Mock Shell Transport for Testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fleetshell::error::{Error, Result};
use fleetshell::session::{ConnectTarget, ShellChannel, ShellConnector};

/// How a mock host behaves
#[derive(Debug, Clone)]
pub enum HostBehaviour {
    /// Connection refused
    Unreachable,
    /// Connect never completes
    Hang,
    /// Answer every command with the same bytes
    Reply(Vec<u8>),
    /// Answer with the command text followed by the reply, like a shell echo
    Echo(Vec<u8>),
    /// Answer `commands` commands with the reply, then drop the channel
    DropAfter { reply: Vec<u8>, commands: usize },
    /// Wrong password
    RejectLogin,
}

/// Connector whose hosts follow scripted behaviours
///
/// Hosts without a behaviour answer `"OK\n"`.
#[derive(Default)]
pub struct MockConnector {
    behaviours: Mutex<HashMap<String, HostBehaviour>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    connects: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how `host` behaves
    pub fn with_host(self, host: &str, behaviour: HostBehaviour) -> Self {
        self.behaviours
            .lock()
            .unwrap()
            .insert(host.to_string(), behaviour);
        self
    }

    /// Every `(host, text)` written to any channel, in order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Text written to the channels of `host`
    pub fn sent_to(&self, host: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, text)| text)
            .collect()
    }

    /// Hosts a connection was attempted to, in order
    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    fn behaviour(&self, host: &str) -> HostBehaviour {
        self.behaviours
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_else(|| HostBehaviour::Reply(b"OK\n".to_vec()))
    }
}

#[async_trait]
impl ShellConnector for MockConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn ShellChannel>> {
        self.connects.lock().unwrap().push(target.host.clone());

        let (reply, echo, drop_after) = match self.behaviour(&target.host) {
            HostBehaviour::Unreachable => {
                return Err(Error::ConnectFailed {
                    address: target.display_address(),
                    reason: "connection refused".to_string(),
                })
            }
            HostBehaviour::Hang => {
                std::future::pending::<()>().await;
                return Err(Error::ChannelClosed);
            }
            HostBehaviour::RejectLogin => {
                return Err(Error::AuthenticationRejected {
                    address: target.display_address(),
                    username: target.credentials.username.clone(),
                })
            }
            HostBehaviour::Reply(reply) => (reply, false, None),
            HostBehaviour::Echo(reply) => (reply, true, None),
            HostBehaviour::DropAfter { reply, commands } => (reply, false, Some(commands)),
        };

        Ok(Box::new(MockChannel {
            host: target.host.clone(),
            reply,
            echo,
            drop_after,
            answered: 0,
            pending: Vec::new(),
            open: true,
            sent: self.sent.clone(),
        }))
    }
}

/// Channel that answers each write from its host's behaviour
pub struct MockChannel {
    host: String,
    reply: Vec<u8>,
    echo: bool,
    drop_after: Option<usize>,
    answered: usize,
    pending: Vec<u8>,
    open: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl ShellChannel for MockChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        if self.drop_after.is_some_and(|limit| self.answered >= limit) {
            self.open = false;
            return Err(Error::ChannelClosed);
        }

        let text = String::from_utf8_lossy(data).to_string();
        self.sent.lock().unwrap().push((self.host.clone(), text));
        if self.echo {
            self.pending.extend_from_slice(data);
        }
        self.pending.extend_from_slice(&self.reply);
        self.answered += 1;
        Ok(())
    }

    fn read_available(&mut self, limit: usize) -> Result<Vec<u8>> {
        let take = limit.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
