//! Output Capture Strategies
//!
//! After a command is sent, a strategy decides how long to wait and when
//! the command's output is complete. [`FixedDelay`] waits a set time and
//! takes one read. [`IdleTimeout`] keeps reading until the device has been
//! quiet for a while. [`PromptMatch`] keeps reading until the last line of
//! output looks like a prompt. The last two are bounded by `max_wait`.

use async_trait::async_trait;
use regex::Regex;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::ShellChannel;
use crate::error::Result;

/// Poll interval floor for the polling strategies
const MIN_POLL: Duration = Duration::from_millis(10);

/// Decides when a command's output has been fully received
#[async_trait]
pub trait CaptureStrategy: Send + Sync + Debug {
    /// Collect at most `limit` bytes of output from `channel`
    async fn capture(&self, channel: &mut dyn ShellChannel, limit: usize) -> Result<Vec<u8>>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Wait a fixed time, then take whatever is buffered
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl CaptureStrategy for FixedDelay {
    async fn capture(&self, channel: &mut dyn ShellChannel, limit: usize) -> Result<Vec<u8>> {
        sleep(self.delay).await;
        channel.read_available(limit)
    }

    fn name(&self) -> &'static str {
        "fixed-delay"
    }
}

/// Read until no output has arrived for `idle`, or `max_wait` has passed
#[derive(Debug, Clone)]
pub struct IdleTimeout {
    idle: Duration,
    max_wait: Duration,
}

impl IdleTimeout {
    pub fn new(idle: Duration, max_wait: Duration) -> Self {
        Self { idle, max_wait }
    }

    fn poll_interval(&self) -> Duration {
        (self.idle / 5).max(MIN_POLL)
    }
}

#[async_trait]
impl CaptureStrategy for IdleTimeout {
    async fn capture(&self, channel: &mut dyn ShellChannel, limit: usize) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut last_output = started;
        let mut buffer = Vec::new();

        loop {
            sleep(self.poll_interval()).await;
            let chunk = channel.read_available(limit - buffer.len())?;
            let now = Instant::now();
            if !chunk.is_empty() {
                buffer.extend_from_slice(&chunk);
                last_output = now;
            }

            if buffer.len() >= limit {
                debug!("Capture stopped at read limit of {} bytes", limit);
                break;
            }
            if now.duration_since(last_output) >= self.idle {
                break;
            }
            if now.duration_since(started) >= self.max_wait {
                debug!("Capture stopped after {:?} without going idle", self.max_wait);
                break;
            }
            if !channel.is_open() {
                break;
            }
        }

        Ok(buffer)
    }

    fn name(&self) -> &'static str {
        "idle-timeout"
    }
}

/// Read until the last output line matches a prompt pattern, or `max_wait`
/// has passed
#[derive(Debug, Clone)]
pub struct PromptMatch {
    prompt: Regex,
    poll: Duration,
    max_wait: Duration,
}

impl PromptMatch {
    /// `pattern` is matched against the final line of output
    pub fn new(pattern: &str, poll: Duration, max_wait: Duration) -> Result<Self> {
        Ok(Self {
            prompt: Regex::new(pattern)?,
            poll: poll.max(MIN_POLL),
            max_wait,
        })
    }

    /// Whether the output ends on a prompt line
    pub fn ends_with_prompt(&self, output: &[u8]) -> bool {
        let text = String::from_utf8_lossy(output);
        let last_line = text
            .trim_end_matches(['\r', '\n'])
            .rsplit(['\r', '\n'])
            .next()
            .unwrap_or("");
        !last_line.is_empty() && self.prompt.is_match(last_line)
    }
}

#[async_trait]
impl CaptureStrategy for PromptMatch {
    async fn capture(&self, channel: &mut dyn ShellChannel, limit: usize) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut buffer = Vec::new();

        loop {
            sleep(self.poll).await;
            let chunk = channel.read_available(limit - buffer.len())?;
            let grew = !chunk.is_empty();
            buffer.extend_from_slice(&chunk);

            if buffer.len() >= limit {
                debug!("Capture stopped at read limit of {} bytes", limit);
                break;
            }
            if grew && self.ends_with_prompt(&buffer) {
                break;
            }
            if started.elapsed() >= self.max_wait {
                debug!("No prompt seen within {:?}", self.max_wait);
                break;
            }
            if !channel.is_open() {
                break;
            }
        }

        Ok(buffer)
    }

    fn name(&self) -> &'static str {
        "prompt-match"
    }
}
