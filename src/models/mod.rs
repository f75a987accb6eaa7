pub mod alert;
pub mod sample;
pub mod session;

pub use alert::{Alert, Evidence, EvidenceMetric, PatternType, Severity};
pub use sample::{DomainSample, EventRecord, VideoFrame};
pub use session::{
    PlaybackMode, Session, SessionCreateRequest, SessionStatus, SourceKind, StatusEvent,
};
