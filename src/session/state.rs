use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Alert, Session, SessionCreateRequest, SessionStatus, StatusEvent};

use super::subscription::SessionUpdate;

const ENABLE_LOGS: bool = true;
use crate::log_info;

/// Position of one recorded item in `alerts` or `status_events`.
#[derive(Debug, Clone, Copy)]
enum Entry {
    Status(usize),
    Alert(usize),
}

#[derive(Debug)]
struct Lists {
    session: Session,
    alerts: Vec<Alert>,
    status_events: Vec<StatusEvent>,
    /// Both lists interleaved in recording order.
    log: Vec<Entry>,
}

/// Shared per-session state. The lists sit behind a short-held lock that is never
/// held across an await, so readers always see a consistent snapshot.
#[derive(Debug)]
pub struct SessionRecord {
    pub id: String,
    pub request: SessionCreateRequest,
    lists: Mutex<Lists>,
}

impl SessionRecord {
    pub fn new(session: Session, request: SessionCreateRequest) -> Self {
        Self {
            id: session.id.clone(),
            request,
            lists: Mutex::new(Lists {
                session,
                alerts: Vec::new(),
                status_events: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    fn lists(&self) -> MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Session {
        self.lists().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lists().session.status
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.lists().alerts.clone()
    }

    pub fn alert_count(&self) -> usize {
        self.lists().alerts.len()
    }

    pub fn status_events(&self) -> Vec<StatusEvent> {
        self.lists().status_events.clone()
    }

    /// Everything recorded after the first `seen` updates, in recording order.
    pub fn updates_since(&self, seen: usize) -> Vec<SessionUpdate> {
        let lists = self.lists();
        lists
            .log
            .iter()
            .skip(seen)
            .map(|entry| match *entry {
                Entry::Status(i) => SessionUpdate::Status(lists.status_events[i].clone()),
                Entry::Alert(i) => SessionUpdate::Alert(lists.alerts[i].clone()),
            })
            .collect()
    }

    /// Sets the status and records the transition.
    pub fn push_status(&self, status: SessionStatus, detail: impl Into<String>) -> StatusEvent {
        let mut lists = self.lists();
        lists.session.status = status;
        Self::record(&mut lists, status, detail.into())
    }

    /// Moves to `to` only when the current status is `from`.
    pub fn transition(
        &self,
        from: SessionStatus,
        to: SessionStatus,
        detail: impl Into<String>,
    ) -> Option<StatusEvent> {
        let mut lists = self.lists();
        if lists.session.status != from {
            return None;
        }
        lists.session.status = to;
        Some(Self::record(&mut lists, to, detail.into()))
    }

    /// Appends a status event that repeats the current status.
    pub fn note(&self, detail: impl Into<String>) -> StatusEvent {
        let mut lists = self.lists();
        let status = lists.session.status;
        Self::record(&mut lists, status, detail.into())
    }

    pub fn push_alert(&self, alert: Alert, detail: impl Into<String>) {
        let mut lists = self.lists();
        let index = lists.alerts.len();
        lists.alerts.push(alert);
        lists.log.push(Entry::Alert(index));
        let status = lists.session.status;
        Self::record(&mut lists, status, detail.into());
    }

    fn record(lists: &mut Lists, status: SessionStatus, detail: String) -> StatusEvent {
        let now = Utc::now();
        let timestamp = lists
            .status_events
            .last()
            .map_or(now, |prev| now.max(prev.timestamp));
        log_info!("session {} -> {}: {}", lists.session.id, status.as_str(), detail);
        let event = StatusEvent {
            session_id: lists.session.id.clone(),
            status,
            timestamp,
            detail: Some(detail),
        };
        let index = lists.status_events.len();
        lists.status_events.push(event.clone());
        lists.log.push(Entry::Status(index));
        event
    }
}
