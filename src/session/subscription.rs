use serde::Serialize;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::models::{Alert, StatusEvent};

use super::state::SessionRecord;

const ENABLE_LOGS: bool = true;
use crate::log_debug;

const UPDATE_BUFFER: usize = 64;

/// One item pushed to a session subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    Status(StatusEvent),
    Alert(Alert),
}

/// Polls the session every `poll_interval` and forwards, in recording order, only
/// what the subscriber has not seen yet. Ends when the receiver is dropped or the
/// session is gone.
pub(crate) fn spawn_forwarder(
    record: Weak<SessionRecord>,
    poll_interval: Duration,
) -> mpsc::Receiver<SessionUpdate> {
    let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seen = 0usize;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => break,
            }

            let Some(record) = record.upgrade() else {
                break;
            };
            let updates = record.updates_since(seen);
            drop(record);

            seen += updates.len();
            for update in updates {
                if tx.send(update).await.is_err() {
                    return;
                }
            }
        }
        log_debug!("session subscriber finished");
    });

    rx
}
