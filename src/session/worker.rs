use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    analysis::{Detection, PatternAnalyzer},
    error::Error,
    evidence::{EvidenceRenderer, EvidenceRequest},
    ingest::{SourcePull, SourcePump},
    models::{Alert, DomainSample, Evidence, SessionStatus},
    settings::Settings,
};

use super::{copy::alert_copy, cooldown::CooldownTracker, state::SessionRecord};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

/// Stream time covered by an alert, ending at the evaluation timestamp.
const ALERT_SPAN_SECS: f64 = 5.0;

enum Ending {
    Completed,
    Cancelled,
    StatusChanged,
}

type SharedAnalyzer = Arc<Mutex<Box<dyn PatternAnalyzer>>>;

fn lock(analyzer: &SharedAnalyzer) -> MutexGuard<'_, Box<dyn PatternAnalyzer>> {
    analyzer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything one session's background execution owns besides its source.
pub struct Pipeline {
    record: Arc<SessionRecord>,
    /// Shared with the blocking pool, where samples are observed.
    analyzer: SharedAnalyzer,
    renderer: Arc<dyn EvidenceRenderer>,
    settings: Arc<Settings>,
    cooldown: CooldownTracker,
    last_eval: f64,
}

impl Pipeline {
    pub fn new(
        record: Arc<SessionRecord>,
        analyzer: Box<dyn PatternAnalyzer>,
        renderer: Arc<dyn EvidenceRenderer>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            cooldown: CooldownTracker::new(settings.cooldown_secs),
            record,
            analyzer: Arc::new(Mutex::new(analyzer)),
            renderer,
            settings,
            last_eval: 0.0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.record.id
    }

    /// Observes on the blocking pool, then evaluates every `eval_interval_secs` of
    /// stream time.
    async fn on_sample(&mut self, sample: DomainSample, ts: f64) {
        let analyzer = Arc::clone(&self.analyzer);
        let observed = tokio::task::spawn_blocking(move || {
            lock(&analyzer).observe(sample, ts);
        })
        .await;
        if let Err(err) = observed {
            log_warn!("observing sample failed for session {}: {err}", self.record.id);
            self.record.note(format!("analysis_failed: {err}"));
            return;
        }

        if ts - self.last_eval >= self.settings.eval_interval_secs {
            self.last_eval = ts;
            self.evaluate(ts).await;
        }
    }

    async fn evaluate(&mut self, now: f64) {
        let results = lock(&self.analyzer).evaluate(now);
        let mut detections = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(detection) => detections.push(detection),
                Err(err) => {
                    log_warn!("analysis failed for session {}: {err}", self.record.id);
                    self.record.note(format!("analysis_failed: {err}"));
                }
            }
        }

        let mut emitted = false;
        for detection in detections {
            if !self.cooldown.ready(detection.pattern, now) {
                continue;
            }
            let detail = format!("{} alert generated", detection.pattern.as_str());
            if self.emit(&detection, now, detail).await {
                self.cooldown.record(detection.pattern, now);
                emitted = true;
            }
        }

        if emitted || self.record.alert_count() > 0 {
            return;
        }
        let fallback = lock(&self.analyzer).fallback(now);
        match fallback {
            Ok(Some(detection)) => {
                if self
                    .emit(&detection, now, "fallback alert generated".to_string())
                    .await
                {
                    self.cooldown.record(detection.pattern, now);
                }
            }
            Ok(None) => {}
            Err(err) => {
                log_warn!("fallback failed for session {}: {err}", self.record.id);
                self.record.note(format!("analysis_failed: {err}"));
            }
        }
    }

    /// Renders evidence and publishes the alert. A render failure drops the detection.
    async fn emit(&mut self, detection: &Detection, now: f64, detail: String) -> bool {
        let alert_id = Uuid::new_v4().to_string();
        let request = EvidenceRequest {
            session_id: self.record.id.clone(),
            alert_id: alert_id.clone(),
            center_ts: now,
            pattern: detection.pattern,
            severity: detection.severity,
            metrics: detection.metrics.clone(),
            context: lock(&self.analyzer).evidence_context(now),
        };

        let renderer = Arc::clone(&self.renderer);
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&request)).await;
        let locators = match rendered {
            Ok(Ok(locators)) => locators,
            Ok(Err(err)) => {
                let err = Error::from(err);
                log_warn!(
                    "dropping {} alert for session {} ({}): {err}",
                    detection.pattern.as_str(),
                    self.record.id,
                    err.code()
                );
                self.record.note(format!("evidence_generation_failed: {err}"));
                return false;
            }
            Err(err) => {
                log_warn!("evidence worker for session {} failed: {err}", self.record.id);
                self.record.note(format!("evidence_generation_failed: {err}"));
                return false;
            }
        };

        let copy = alert_copy(detection);
        let alert = Alert {
            id: alert_id,
            ts_start: (now - ALERT_SPAN_SECS).max(0.0),
            ts_end: now,
            pattern_type: detection.pattern,
            severity: detection.severity,
            claim: copy.claim,
            recommendation: copy.recommendation,
            risk: copy.risk,
            evidence: Evidence {
                clip_urls: vec![locators.clip_url],
                overlay_urls: vec![locators.overlay_url],
                metrics: detection.metrics.clone(),
            },
        };
        log_info!(
            "session {} alert {} {} at {:.1}s",
            self.record.id,
            detection.pattern.as_str(),
            detection.severity.as_str(),
            now
        );
        self.record.push_alert(alert, detail);
        true
    }
}

/// Pulls samples until end of stream, cancellation, or the session leaving RUNNING.
/// Always releases the source before recording the final status.
pub async fn pipeline_loop(
    mut pipeline: Pipeline,
    mut pump: SourcePump,
    cancel_token: CancellationToken,
    reason_rx: watch::Receiver<Option<String>>,
) {
    let ending = loop {
        if pipeline.record.status() != SessionStatus::Running {
            break Ending::StatusChanged;
        }

        let pulled = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break Ending::Cancelled,
            pulled = pump.recv() => pulled,
        };

        match pulled {
            Some(SourcePull::Sample { sample, ts }) => pipeline.on_sample(sample, ts).await,
            Some(SourcePull::Failed(detail)) => {
                pipeline
                    .record
                    .note(format!("source_read_failed: {detail}"));
                break Ending::Completed;
            }
            None => break Ending::Completed,
        }
    };

    let grace = pipeline.settings.source_shutdown_grace();
    if !pump.shutdown(grace).await {
        pipeline
            .record
            .note(format!("source_release_timed_out: reader still blocked after {grace:?}"));
    }

    let detail = match ending {
        Ending::Cancelled => reason_rx
            .borrow()
            .clone()
            .unwrap_or_else(|| "Stopped".to_string()),
        Ending::Completed | Ending::StatusChanged => "Stream completed".to_string(),
    };
    if pipeline
        .record
        .transition(SessionStatus::Running, SessionStatus::Stopped, detail)
        .is_none()
    {
        log_info!(
            "session {} already {} when its pipeline ended",
            pipeline.record.id,
            pipeline.record.status().as_str()
        );
    }
}
