//! Shell Streams
//!
//! Bridges a transport's output pump to bounded, non-blocking reads. The
//! pump pushes byte chunks into an unbounded channel as they arrive;
//! [`ShellStreams::take_available`] drains whatever is queued and hands
//! back at most `limit` bytes.
//!
//! Bytes beyond the limit are not dropped: they stay in a carry buffer
//! and lead the next read, the way unread data stays in a socket buffer.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Output side of an interactive shell channel
pub struct ShellStreams {
    /// Chunks pushed by the transport
    output_rx: UnboundedReceiver<Vec<u8>>,
    /// Bytes received but not yet handed out
    carry: Vec<u8>,
    /// The sending side is gone
    disconnected: bool,
    stats: StreamStats,
}

impl ShellStreams {
    /// Wrap the receiving end of a transport's output channel
    pub fn from_channel(output_rx: UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            output_rx,
            carry: Vec::new(),
            disconnected: false,
            stats: StreamStats::default(),
        }
    }

    fn drain_channel(&mut self) {
        loop {
            match self.output_rx.try_recv() {
                Ok(chunk) => self.carry.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    /// Take up to `limit` bytes of what is buffered right now, without waiting
    pub fn take_available(&mut self, limit: usize) -> Vec<u8> {
        self.drain_channel();

        let take = limit.min(self.carry.len());
        let chunk: Vec<u8> = self.carry.drain(..take).collect();
        if !self.carry.is_empty() {
            debug!(
                "Read limit of {} bytes reached, {} bytes carried to the next read",
                limit,
                self.carry.len()
            );
        }

        self.stats.read_operations += 1;
        self.stats.bytes_read += chunk.len() as u64;
        if chunk.is_empty() {
            self.stats.empty_reads += 1;
        }
        chunk
    }

    /// Bytes waiting in the carry buffer
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// The transport stopped producing output
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Count a write made through the transport
    pub fn record_write(&mut self, bytes: usize) {
        self.stats.write_operations += 1;
        self.stats.bytes_written += bytes as u64;
    }

    /// Transfer statistics so far
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Number of read operations
    pub read_operations: u64,
    /// Number of write operations
    pub write_operations: u64,
    /// Reads that found nothing buffered
    pub empty_reads: u64,
}

impl StreamStats {
    /// Get read throughput (bytes per operation)
    pub fn read_throughput(&self) -> f64 {
        if self.read_operations == 0 {
            0.0
        } else {
            self.bytes_read as f64 / self.read_operations as f64
        }
    }
}
