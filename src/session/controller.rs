use anyhow::{bail, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ingest::SourcePump;

use super::worker::{pipeline_loop, Pipeline};

const ENABLE_LOGS: bool = true;
use crate::{log_error, log_info};

/// Owns the one background execution a session may have.
pub struct PipelineController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    reason_tx: Option<watch::Sender<Option<String>>>,
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            reason_tx: None,
        }
    }

    /// A spawned execution that has not finished yet.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start(&mut self, pipeline: Pipeline, pump: SourcePump) -> Result<()> {
        if self.is_active() {
            bail!("pipeline already active for session {}", pipeline.session_id());
        }

        let cancel_token = CancellationToken::new();
        let (reason_tx, reason_rx) = watch::channel(None);
        let handle = tokio::spawn(pipeline_loop(pipeline, pump, cancel_token.clone(), reason_rx));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.reason_tx = Some(reason_tx);
        Ok(())
    }

    /// Cancels the execution with `reason` and waits for it to release its source.
    /// Returns whether an execution was still live when asked to stop.
    pub async fn stop(&mut self, reason: &str) -> bool {
        let was_live = self.is_active();

        if let Some(tx) = self.reason_tx.take() {
            let _ = tx.send(Some(reason.to_string()));
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log_error!("pipeline task failed to join: {err}");
            } else if was_live {
                log_info!("pipeline stopped: {}", reason);
            }
        }
        was_live
    }
}
