//! The unified error taxonomy (kinds, not type names) shared by every
//! scanner crate.

use thiserror::Error;

/// Top-level error type. Only the `Fatal` and `Configuration` variants are
/// allowed to escape `Scanner::scan`; everything else degrades into a
/// threat or a performance-counter increment at the point it occurs.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Invalid option value, unknown provider, invalid custom-rule regex
    /// when the regex cannot be worked around by skipping the rule.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unreadable file, path traversal, archive extraction failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Timeout, TLS failure, rate limit exhaustion, 5xx from a remote
    /// service, after retries are exhausted.
    #[error("network error: {0}")]
    Network(String),

    /// Sandbox timeout, memory ceiling, or disallowed capability that could
    /// not be converted into a threat (e.g. the sandbox itself failed to
    /// start).
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Analyzer parse failure or visitor panic, captured per analyzer.
    #[error("analyzer error in {analyzer}: {message}")]
    Analyzer { analyzer: String, message: String },

    /// Cancellation or unrecoverable system error (e.g. cannot create a
    /// temp directory). The scan aborts and the partial result is
    /// discarded.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ScanError {
    #[must_use]
    pub fn analyzer(analyzer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Analyzer {
            analyzer: analyzer.into(),
            message: message.into(),
        }
    }

    /// True for kinds permitted to propagate out of `Scanner::scan`; every
    /// other kind must be converted to a threat or counter increment by its
    /// caller before it would otherwise cross a component boundary.
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_and_fatal_surface() {
        assert!(ScanError::Configuration("x".into()).is_surfaced());
        assert!(ScanError::Fatal("x".into()).is_surfaced());
        assert!(!ScanError::Io("x".into()).is_surfaced());
        assert!(!ScanError::Network("x".into()).is_surfaced());
        assert!(!ScanError::Sandbox("x".into()).is_surfaced());
        assert!(!ScanError::analyzer("entropy", "boom").is_surfaced());
    }
}
