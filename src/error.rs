//! Error taxonomy surfaced by the session pipeline.

use crate::evidence::EvidenceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown session id. Surfaced to the caller, never retried.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Malformed create request or a start that cannot be satisfied by the data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Adapter open/read failure.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("evidence rendering failed: {0}")]
    EvidenceRenderFailure(#[from] EvidenceError),

    /// Required dataset or configuration files are missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(id: &str) -> Self {
        Error::NotFound(id.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            Error::EvidenceRenderFailure(_) => "EVIDENCE_RENDER_FAILURE",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::not_found("abc").code(), "NOT_FOUND");
        assert_eq!(Error::Validation("fps".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            Error::SourceUnavailable("gone".into()).to_string(),
            "source unavailable: gone"
        );
    }
}
