use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::models::DomainSample;

use super::{ReadInterrupt, SourceAdapter};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;
const READ_ERROR_BACKOFF_MS: u64 = 50;

#[derive(Debug)]
pub enum SourcePull {
    Sample { sample: DomainSample, ts: f64 },
    /// Too many consecutive read errors; the stream is treated as ended.
    Failed(String),
}

/// Drives a blocking adapter on tokio's blocking pool and forwards samples to the
/// owning session task. The adapter is closed exactly once, by the pump thread.
pub struct SourcePump {
    session_id: String,
    rx: mpsc::Receiver<SourcePull>,
    stop: Arc<AtomicBool>,
    interrupt: Option<Arc<dyn ReadInterrupt>>,
    handle: JoinHandle<()>,
}

impl SourcePump {
    pub fn spawn(session_id: String, adapter: Box<dyn SourceAdapter>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let interrupt = adapter.interrupter();
        let handle = tokio::task::spawn_blocking({
            let stop = Arc::clone(&stop);
            let session_id = session_id.clone();
            move || pump_loop(session_id, adapter, tx, stop)
        });

        Self {
            session_id,
            rx,
            stop,
            interrupt,
            handle,
        }
    }

    /// `None` once the pump has finished and every forwarded sample was consumed.
    pub async fn recv(&mut self) -> Option<SourcePull> {
        self.rx.recv().await
    }

    /// Stops the reader, interrupts a pending read and waits up to `grace` for the
    /// adapter to be closed. Returns `false` when the reader had to be detached; that
    /// only happens for adapters without an interrupter.
    pub async fn shutdown(self, grace: Duration) -> bool {
        let SourcePump {
            session_id,
            rx,
            stop,
            interrupt,
            handle,
        } = self;
        stop.store(true, Ordering::Release);
        if let Some(interrupt) = &interrupt {
            interrupt.interrupt();
        }
        drop(rx);

        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {
                log_debug!("source pump for session {} released", session_id);
                true
            }
            Ok(Err(err)) => {
                log_warn!("source pump for session {} panicked: {err}", session_id);
                true
            }
            Err(_) => {
                log_warn!(
                    "source pump for session {} still blocked after {:?}, detaching",
                    session_id,
                    grace
                );
                false
            }
        }
    }
}

fn pump_loop(
    session_id: String,
    mut adapter: Box<dyn SourceAdapter>,
    tx: mpsc::Sender<SourcePull>,
    stop: Arc<AtomicBool>,
) {
    let mut consecutive_errors = 0u32;

    while !stop.load(Ordering::Acquire) {
        match adapter.read() {
            Ok(Some((sample, ts))) => {
                consecutive_errors = 0;
                if tx.blocking_send(SourcePull::Sample { sample, ts }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                if !stop.load(Ordering::Acquire) {
                    log_info!("source for session {} reached end of stream", session_id);
                }
                break;
            }
            Err(err) => {
                consecutive_errors += 1;
                log_warn!(
                    "source read failed for session {} ({}/{}): {err}",
                    session_id,
                    consecutive_errors,
                    MAX_CONSECUTIVE_READ_ERRORS
                );
                if consecutive_errors > MAX_CONSECUTIVE_READ_ERRORS {
                    let _ = tx.blocking_send(SourcePull::Failed(err.to_string()));
                    break;
                }
                thread::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS));
            }
        }
    }

    adapter.close();
}
