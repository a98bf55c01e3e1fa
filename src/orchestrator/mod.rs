//! Execution Orchestrator
//!
//! Runs every device of a catalog: merge its rows, open a shell session,
//! send the commands one by one, persist each captured output as it
//! arrives, close the session, report the outcome. A failure on one device
//! never stops the others; only a catalog without login columns stops the
//! whole batch, before any device is touched.
//!
//! Devices run one after another unless `concurrency` is raised, in which
//! case up to that many devices run at once. Commands within a device are
//! always strictly ordered.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{merge_fragments, DeviceCatalog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{ProgressEvent, ProgressReporter};
use crate::models::{DeviceOutcome, DeviceRecord, DeviceReport, ExecutionSummary};
use crate::session::{
    CaptureStrategy, ConnectTarget, RusshConnector, ShellConnector, ShellSession,
};
use crate::sink::ResultSink;

pub use crate::catalog::MergePolicy;

/// Batch-wide execution parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    /// Port used when an address carries none
    pub default_port: u16,
    /// Bound on connect, authenticate and shell start
    pub connect_timeout: Duration,
    /// Most bytes taken per command capture
    pub read_buffer_limit: usize,
    /// How a device's rows are collapsed
    pub merge_policy: MergePolicy,
    /// Devices run at the same time
    pub concurrency: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Config::default().execution_settings()
    }
}

/// Drives sessions across the devices of a catalog
pub struct ExecutionOrchestrator {
    connector: Arc<dyn ShellConnector>,
    capture: Arc<dyn CaptureStrategy>,
    settings: ExecutionSettings,
}

impl ExecutionOrchestrator {
    pub fn new(
        connector: Arc<dyn ShellConnector>,
        capture: Arc<dyn CaptureStrategy>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            connector,
            capture,
            settings,
        }
    }

    /// SSH orchestrator configured from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = config.session.host_keys.build()?;
        let connector = RusshConnector::new(policy, config.session.terminal.clone());
        Ok(Self::new(
            Arc::new(connector),
            config.session.capture.build()?,
            config.execution_settings(),
        ))
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Execute every device of `catalog`
    ///
    /// Fails only when the catalog has no login columns; device failures
    /// are recorded in the summary instead.
    pub async fn execute(
        &self,
        catalog: &DeviceCatalog,
        sink: &dyn ResultSink,
        progress: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary> {
        if !catalog.executable_columns_present() {
            let err = Error::LoginColumnsMissing {
                missing: catalog.missing_login_columns().to_vec(),
            };
            warn!("Execution refused: {}", err);
            progress.notify(ProgressEvent::BatchError {
                message: err.to_string(),
            });
            return Err(err);
        }

        let concurrency = self.settings.concurrency.max(1);
        info!(
            "Executing {} devices (concurrency {}, capture {})",
            catalog.device_count(),
            concurrency,
            self.capture.name()
        );

        let cancel = &cancel;
        let policy = self.settings.merge_policy;
        let records: Vec<(usize, DeviceRecord)> = catalog
            .devices()
            .map(|(name, fragments)| merge_fragments(name, fragments, policy))
            .enumerate()
            .collect();

        let mut reports: Vec<(usize, DeviceReport)> = stream::iter(records)
            .map(|(index, record)| async move {
                let outcome = self.run_device(&record, sink, progress, cancel).await;
                (
                    index,
                    DeviceReport {
                        device: record.name,
                        outcome,
                    },
                )
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        reports.sort_by_key(|(index, _)| *index);

        let summary = ExecutionSummary {
            devices: reports.into_iter().map(|(_, report)| report).collect(),
        };

        if cancel.is_cancelled() {
            progress.notify(ProgressEvent::Cancelled);
        }
        info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded(),
            summary.failed()
        );
        progress.notify(ProgressEvent::BatchFinished {
            succeeded: summary.succeeded(),
            failed: summary.failed(),
        });
        Ok(summary)
    }

    async fn run_device(
        &self,
        record: &DeviceRecord,
        sink: &dyn ResultSink,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> DeviceOutcome {
        let (outcome, result_path) = self.drive_device(record, sink, progress, cancel).await;

        if let DeviceOutcome::Partial { error, .. }
        | DeviceOutcome::ConnectFailed { error }
        | DeviceOutcome::WriteFailed { error, .. } = &outcome
        {
            progress.notify(ProgressEvent::DeviceError {
                device: record.name.clone(),
                message: error.clone(),
            });
        }
        progress.notify(ProgressEvent::DeviceFinished {
            device: record.name.clone(),
            outcome: outcome.clone(),
            result_path,
        });
        outcome
    }

    async fn drive_device(
        &self,
        record: &DeviceRecord,
        sink: &dyn ResultSink,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> (DeviceOutcome, Option<std::path::PathBuf>) {
        let device = record.name.as_str();

        if cancel.is_cancelled() {
            return (DeviceOutcome::Cancelled { completed: 0 }, None);
        }

        let credentials = match &record.credentials {
            Some(credentials) if record.is_executable() => credentials,
            _ => {
                let reason = Error::MissingCredentials {
                    device: device.to_string(),
                }
                .to_string();
                info!("Skipping {}: {}", device, reason);
                return (DeviceOutcome::Skipped { reason }, None);
            }
        };

        let target = ConnectTarget::from_credentials(credentials, self.settings.default_port);
        progress.notify(ProgressEvent::Connecting {
            device: device.to_string(),
            address: target.display_address(),
        });

        let mut session = match ShellSession::open(
            self.connector.as_ref(),
            &target,
            self.settings.connect_timeout,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                return (
                    DeviceOutcome::ConnectFailed {
                        error: e.to_string(),
                    },
                    None,
                )
            }
        };
        progress.notify(ProgressEvent::Connected {
            device: device.to_string(),
        });

        let result_path = match sink.begin(device).await {
            Ok(path) => path,
            Err(e) => {
                close_session(&mut session).await;
                return (
                    DeviceOutcome::WriteFailed {
                        completed: 0,
                        error: e.to_string(),
                    },
                    None,
                );
            }
        };

        let mut completed = 0;
        let mut outcome = None;
        {
            let mut run = session
                .run_sequential(
                    &record.commands,
                    self.capture.clone(),
                    self.settings.read_buffer_limit,
                )
                .cancel_on(cancel.clone());

            while let Some(result) = run.next().await {
                match result {
                    Ok(output) => {
                        if output.replaced_invalid {
                            progress.notify(ProgressEvent::DecodeWarning {
                                device: device.to_string(),
                                command: output.command.clone(),
                            });
                        }
                        if let Err(e) = sink.append(device, &output).await {
                            outcome = Some(DeviceOutcome::WriteFailed {
                                completed,
                                error: e.to_string(),
                            });
                            break;
                        }
                        completed += 1;
                        progress.notify(ProgressEvent::CommandCaptured {
                            device: device.to_string(),
                            command: output.command,
                            bytes: output.raw_len,
                        });
                    }
                    Err(Error::Cancelled) => {
                        info!("{} cancelled after {} commands", device, completed);
                        outcome = Some(DeviceOutcome::Cancelled { completed });
                    }
                    Err(e) => {
                        warn!("{} stopped after {} commands: {}", device, completed, e);
                        outcome = Some(DeviceOutcome::Partial {
                            completed,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        close_session(&mut session).await;

        let finished = sink.finish(device).await;
        let outcome = match (outcome, finished) {
            (Some(outcome), _) => outcome,
            (None, Ok(())) => DeviceOutcome::Completed {
                commands: completed,
            },
            (None, Err(e)) => DeviceOutcome::WriteFailed {
                completed,
                error: e.to_string(),
            },
        };
        debug!("{} finished: {}", device, outcome);
        (outcome, result_path)
    }
}

async fn close_session(session: &mut ShellSession) {
    if let Err(e) = session.close().await {
        debug!("Closing session to {} reported: {}", session.address(), e);
    }
}
