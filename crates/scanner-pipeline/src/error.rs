//! Errors local to the pipeline, folded into [`scanner_core::ScanError`] at
//! each component boundary per the propagation policy of spec §7: only
//! `Configuration` and `Fatal` are allowed to reach the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("manifest is not parseable: {0}")]
    InvalidManifest(String),

    #[error("archive exceeds the size limit: {0} bytes")]
    ArchiveTooLarge(u64),

    #[error("archive is malformed: {0}")]
    ArchiveMalformed(String),

    #[error("archive entry '{0}' escapes the extraction root")]
    PathEscape(String),

    #[error("registry unreachable: {0}")]
    RegistryUnreachable(String),

    #[error("cannot create temporary directory: {0}")]
    TempDirUnavailable(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PipelineError> for scanner_core::ScanError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidManifest(_) | PipelineError::TargetNotFound(_) => {
                scanner_core::ScanError::Configuration(err.to_string())
            }
            PipelineError::ArchiveTooLarge(_) | PipelineError::ArchiveMalformed(_) | PipelineError::PathEscape(_) => {
                scanner_core::ScanError::Io(err.to_string())
            }
            PipelineError::RegistryUnreachable(_) => scanner_core::ScanError::Network(err.to_string()),
            PipelineError::TempDirUnavailable(_) => scanner_core::ScanError::Fatal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_escape_folds_into_io_not_fatal() {
        let scan_err: scanner_core::ScanError = PipelineError::PathEscape("../../etc/passwd".into()).into();
        assert!(!scan_err.is_surfaced());
    }

    #[test]
    fn invalid_manifest_folds_into_configuration() {
        let scan_err: scanner_core::ScanError = PipelineError::InvalidManifest("bad json".into()).into();
        assert!(scan_err.is_surfaced());
    }
}
