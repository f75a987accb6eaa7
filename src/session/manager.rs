use chrono::Utc;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::{
    analysis::analyzer_for,
    dataset::{DatasetCatalog, GameSummary},
    error::{Error, Result},
    evidence::{EvidenceRenderer, FsEvidenceRenderer},
    ingest::{DefaultSourceFactory, SourceAdapter, SourceFactory, SourcePump},
    models::{
        session::non_empty, Alert, Session, SessionCreateRequest, SessionStatus, SourceKind,
        StatusEvent,
    },
    scoring::ShotScorer,
    settings::Settings,
    uploads::{self, UploadIndex, UploadItem, UploadLookup},
};

use super::{
    controller::PipelineController,
    state::SessionRecord,
    subscription::{spawn_forwarder, SessionUpdate},
    worker::Pipeline,
};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

/// Collaborators constructed once at startup and shared by every session.
#[derive(Clone)]
pub struct PipelineServices {
    pub settings: Arc<Settings>,
    pub uploads: Arc<dyn UploadLookup>,
    pub dataset: Option<Arc<DatasetCatalog>>,
    pub scorer: Arc<ShotScorer>,
    pub renderer: Arc<dyn EvidenceRenderer>,
    pub source_factory: Arc<dyn SourceFactory>,
}

impl PipelineServices {
    /// Production wiring. A configured dataset that is missing or malformed is an
    /// error here; a missing scoring model only disables the signal.
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self> {
        let uploads = UploadIndex::open(settings.upload_index_path())?;

        let dataset = match &settings.events_data_path {
            Some(path) => {
                let catalog = DatasetCatalog::new(path.clone(), settings.match_info_path.clone());
                catalog.validate()?;
                Some(Arc::new(catalog))
            }
            None => None,
        };

        Ok(Self {
            uploads: Arc::new(uploads),
            dataset,
            scorer: Arc::new(ShotScorer::load(settings.scoring_model_path.as_deref())),
            renderer: Arc::new(FsEvidenceRenderer::new(Arc::clone(&settings))),
            source_factory: Arc::new(DefaultSourceFactory::new(Arc::clone(&settings))),
            settings,
        })
    }
}

/// Opens the adapter on the blocking pool. An open still pending after `limit` is
/// interrupted, and the adapter is closed whenever that open finally returns.
async fn open_source(
    mut adapter: Box<dyn SourceAdapter>,
    limit: Duration,
) -> Result<Box<dyn SourceAdapter>> {
    let interrupt = adapter.interrupter();
    let mut task = tokio::task::spawn_blocking(move || -> Result<Box<dyn SourceAdapter>> {
        if let Err(err) = adapter.open() {
            adapter.close();
            return Err(err);
        }
        Ok(adapter)
    });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined
            .map_err(|err| Error::SourceUnavailable(format!("source worker failed: {err}")))?,
        Err(_) => {
            if let Some(interrupt) = interrupt {
                interrupt.interrupt();
            }
            tokio::spawn(async move {
                if let Ok(Ok(mut adapter)) = task.await {
                    let _ = tokio::task::spawn_blocking(move || adapter.close()).await;
                }
            });
            Err(Error::SourceUnavailable(format!("open timed out after {limit:?}")))
        }
    }
}

struct SessionEntry {
    record: Arc<SessionRecord>,
    /// Serializes start/stop for this session.
    controller: Mutex<PipelineController>,
}

/// Registry of sessions and the entry point for every lifecycle operation.
pub struct SessionManager {
    services: PipelineServices,
    sessions: Mutex<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    async fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    fn resolve_source_uri(
        &self,
        request: &SessionCreateRequest,
        upload: Option<&UploadItem>,
    ) -> String {
        let uploaded = |file_id: &str| {
            upload
                .map(|item| item.path.clone())
                .unwrap_or_else(|| file_id.to_string())
        };
        match request.source_kind {
            SourceKind::EventLog => {
                if let Some(path) = non_empty(&request.dataset_path).or(non_empty(&request.path)) {
                    return path.to_string();
                }
                if let Some(file_id) = non_empty(&request.file_id) {
                    return uploaded(file_id);
                }
                self.services
                    .settings
                    .events_data_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default()
            }
            SourceKind::File => {
                if let Some(path) = non_empty(&request.path) {
                    return path.to_string();
                }
                non_empty(&request.file_id).map(uploaded).unwrap_or_default()
            }
            SourceKind::Network => non_empty(&request.stream_url).unwrap_or_default().to_string(),
            SourceKind::Device => format!("device://{}", request.device_id),
        }
    }

    pub async fn create(&self, request: SessionCreateRequest) -> Result<Session> {
        request.validate()?;
        let upload = match non_empty(&request.file_id) {
            Some(file_id) => self.services.uploads.lookup(file_id)?,
            None => None,
        };
        let source_uri = self.resolve_source_uri(&request, upload.as_ref());
        // Only uploads the index knows about can be downloaded again.
        let download_url = match (request.source_kind, non_empty(&request.file_id), &upload) {
            (SourceKind::File, Some(file_id), Some(_)) => Some(uploads::download_url(
                &self.services.settings.api_prefix,
                file_id,
            )),
            _ => None,
        };

        let session = Session {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            source_kind: request.source_kind,
            mode: request.mode,
            fps: request.fps,
            buffer_ms: request.buffer_ms,
            source_uri,
            game_id: request.game_id,
            status: SessionStatus::Created,
            download_url,
        };
        let record = Arc::new(SessionRecord::new(session, request));
        record.push_status(SessionStatus::Created, "Session created");
        let snapshot = record.snapshot();

        let entry = Arc::new(SessionEntry {
            record,
            controller: Mutex::new(PipelineController::new()),
        });
        self.sessions.lock().await.insert(snapshot.id.clone(), entry);
        Ok(snapshot)
    }

    /// Checks the event dataset and game id without touching the session status.
    async fn validate_event_source(&self, session: &Session) -> Result<()> {
        let game_id = session.game_id.ok_or_else(|| {
            Error::Validation("game_id is required for event_log sources".into())
        })?;
        if session.source_uri.is_empty() {
            return Err(Error::Validation("no event dataset configured".into()));
        }

        let catalog = DatasetCatalog::new(PathBuf::from(&session.source_uri), None);
        let checked = tokio::task::spawn_blocking(move || {
            catalog.validate()?;
            catalog.ensure_game_id_exists(game_id)
        })
        .await
        .map_err(|err| Error::Validation(format!("dataset check failed: {err}")))?;

        checked.map_err(|err| match err {
            Error::Configuration(detail) => Error::Validation(detail),
            other => other,
        })
    }

    pub async fn start(&self, id: &str) -> Result<Session> {
        let entry = self.entry(id).await?;
        let mut controller = entry.controller.lock().await;
        let record = &entry.record;

        match record.status() {
            SessionStatus::Running | SessionStatus::Lost | SessionStatus::Stopped => {
                return Ok(record.snapshot());
            }
            SessionStatus::Created | SessionStatus::Connecting => {}
        }

        let session = record.snapshot();
        if session.source_kind == SourceKind::EventLog {
            self.validate_event_source(&session).await?;
        }

        record.push_status(SessionStatus::Connecting, "Connecting to source");

        let limit = self.services.settings.source_open_timeout();
        let opened = match self.services.source_factory.build(&session, &record.request) {
            Ok(adapter) => open_source(adapter, limit).await,
            Err(err) => Err(err),
        };

        let adapter = match opened {
            Ok(adapter) => adapter,
            Err(err) => {
                log_warn!("session {} could not open its source: {err}", id);
                record.push_status(SessionStatus::Lost, format!("Failed to open source: {err}"));
                return Ok(record.snapshot());
            }
        };

        record.push_status(SessionStatus::Running, "Pipeline started");
        let session = record.snapshot();
        let analyzer = analyzer_for(
            session.source_kind,
            &session.source_uri,
            session.fps,
            Arc::clone(&self.services.scorer),
            self.services.settings.demo_mode,
        );
        let pipeline = Pipeline::new(
            Arc::clone(record),
            analyzer,
            Arc::clone(&self.services.renderer),
            Arc::clone(&self.services.settings),
        );
        let pump = SourcePump::spawn(id.to_string(), adapter);
        if let Err(err) = controller.start(pipeline, pump) {
            log_warn!("session {}: {err:#}", id);
        }

        log_info!("session {} started ({})", id, session.source_uri);
        Ok(record.snapshot())
    }

    pub async fn stop(&self, id: &str, reason: Option<&str>) -> Result<Session> {
        let entry = self.entry(id).await?;
        let mut controller = entry.controller.lock().await;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or("Stopped");

        if !controller.stop(reason).await {
            match entry.record.status() {
                SessionStatus::Stopped | SessionStatus::Running => {
                    entry.record.push_status(SessionStatus::Stopped, reason);
                }
                SessionStatus::Created | SessionStatus::Connecting | SessionStatus::Lost => {}
            }
        }
        Ok(entry.record.snapshot())
    }

    pub async fn list(&self) -> Vec<Session> {
        let entries: Vec<Arc<SessionEntry>> =
            self.sessions.lock().await.values().cloned().collect();
        let mut sessions: Vec<Session> = entries.iter().map(|e| e.record.snapshot()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub async fn get(&self, id: &str) -> Result<Session> {
        Ok(self.entry(id).await?.record.snapshot())
    }

    pub async fn alerts(&self, id: &str) -> Result<Vec<Alert>> {
        Ok(self.entry(id).await?.record.alerts())
    }

    pub async fn status_events(&self, id: &str) -> Result<Vec<StatusEvent>> {
        Ok(self.entry(id).await?.record.status_events())
    }

    /// Streams status events and alerts from the beginning of the session.
    pub async fn subscribe(
        &self,
        id: &str,
        poll_interval: Duration,
    ) -> Result<mpsc::Receiver<SessionUpdate>> {
        let entry = self.entry(id).await?;
        Ok(spawn_forwarder(Arc::downgrade(&entry.record), poll_interval))
    }

    /// Games in the configured dataset.
    pub async fn games(&self, limit: Option<usize>) -> Result<Vec<GameSummary>> {
        let catalog = self
            .services
            .dataset
            .clone()
            .ok_or_else(|| Error::Configuration("no event dataset configured".into()))?;
        tokio::task::spawn_blocking(move || catalog.list_games(limit))
            .await
            .map_err(|err| Error::Configuration(format!("dataset worker failed: {err}")))?
    }

    /// Stops every session that still has a live execution.
    pub async fn shutdown(&self, reason: &str) {
        let entries: Vec<Arc<SessionEntry>> =
            self.sessions.lock().await.values().cloned().collect();
        for entry in entries {
            let mut controller = entry.controller.lock().await;
            if controller.stop(reason).await {
                log_info!("session {} stopped on shutdown", entry.record.id);
            }
        }
    }
}
