//! Batch Tasks
//!
//! Runs an execution batch in the background so a front end stays
//! responsive while devices are processed.
//!
//! ```text
//! ┌──────────────────┐          ┌──────────────────┐
//! │    Front end     │          │  Batch task      │
//! │                  │          │  (orchestrator)  │
//! │  cancel() ─────────────────▶│  token           │
//! │                  │          │                  │
//! │  subscribe() ◀──────────────│  ChannelReporter │
//! │  wait()      ◀──────────────│  JoinHandle      │
//! └──────────────────┘          └──────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::DeviceCatalog;
use crate::error::{Error, Result};
use crate::events::{ChannelReporter, TimestampedEvent};
use crate::models::ExecutionSummary;
use crate::orchestrator::ExecutionOrchestrator;
use crate::sink::ResultSink;

/// Handle to an execution batch running on the tokio runtime
pub struct BatchTask {
    id: Uuid,
    cancel: CancellationToken,
    events: Option<UnboundedReceiver<TimestampedEvent>>,
    handle: JoinHandle<Result<ExecutionSummary>>,
}

impl BatchTask {
    /// Spawn the batch; must be called from within a tokio runtime
    pub fn start(
        orchestrator: Arc<ExecutionOrchestrator>,
        catalog: Arc<DeviceCatalog>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (reporter, events) = ChannelReporter::new();

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!("Batch {} started", id);
            let result = orchestrator
                .execute(&catalog, sink.as_ref(), &reporter, token)
                .await;
            debug!("Batch {} ended", id);
            result
        });

        Self {
            id,
            cancel,
            events: Some(events),
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the batch to stop before the next command or device
    pub fn cancel(&self) {
        info!("Cancelling batch {}", self.id);
        self.cancel.cancel();
    }

    /// Token that cancels this batch when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the progress event stream; only the first call gets it
    pub fn subscribe(&mut self) -> Option<UnboundedReceiver<TimestampedEvent>> {
        self.events.take()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the batch to end
    pub async fn wait(self) -> Result<ExecutionSummary> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Other(format!("batch task failed: {}", e))),
        }
    }
}
