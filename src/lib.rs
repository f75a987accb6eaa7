//! Live tactical pattern alerts over match video and event streams.
//!
//! A [`SessionManager`] owns sessions; each running session pulls samples from a
//! source adapter, feeds a pattern analyzer and publishes alerts backed by rendered
//! evidence.

pub mod utils;

pub mod analysis;
pub mod dataset;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod models;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod uploads;

pub use error::{Error, Result};
pub use evidence::{EvidenceError, EvidenceLocators, EvidenceRenderer, EvidenceRequest};
pub use ingest::{SourceAdapter, SourceFactory};
pub use models::{
    Alert, DomainSample, EventRecord, PatternType, Session, SessionCreateRequest, SessionStatus,
    Severity, SourceKind, StatusEvent,
};
pub use session::{PipelineServices, SessionManager, SessionUpdate};
pub use settings::Settings;
pub use utils::init_logging;
