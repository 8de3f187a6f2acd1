//! Error types for the record builders
//!
//! Builder operations report three outcomes: success, a parameter
//! combination that is never valid, or a combination the configured
//! hardware cannot perform. Buffer-size mismatches carry the exact
//! word counts so callers can resize and retry.

use std::fmt;

/// Errors produced while building SA records or token contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// The parameter combination is invalid regardless of hardware
    InvalidParameter(String),

    /// The parameter combination is valid but unsupported by the
    /// configured hardware capabilities
    UnsupportedFeature(String),

    /// The output buffer is smaller than the record requires
    BufferTooShort {
        /// Words the record requires
        required: usize,
        /// Words the caller supplied
        available: usize,
    },
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            BuilderError::UnsupportedFeature(msg) => write!(f, "unsupported feature: {}", msg),
            BuilderError::BufferTooShort {
                required,
                available,
            } => write!(
                f,
                "buffer too short: need {} words, have {}",
                required, available
            ),
        }
    }
}

impl std::error::Error for BuilderError {}

impl From<BuilderError> for sabre_platform::SabreError {
    fn from(err: BuilderError) -> Self {
        match err {
            BuilderError::UnsupportedFeature(msg) => sabre_platform::SabreError::Unsupported(msg),
            other => sabre_platform::SabreError::InvalidParameter(other.to_string()),
        }
    }
}

/// Result type for builder operations
pub type BuilderResult<T> = Result<T, BuilderError>;

pub(crate) fn invalid(msg: &str) -> BuilderError {
    BuilderError::InvalidParameter(msg.to_string())
}

pub(crate) fn unsupported(msg: &str) -> BuilderError {
    BuilderError::UnsupportedFeature(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuilderError::BufferTooShort {
            required: 80,
            available: 64,
        };
        assert_eq!(err.to_string(), "buffer too short: need 80 words, have 64");
    }

    #[test]
    fn test_platform_conversion() {
        let err: sabre_platform::SabreError =
            BuilderError::UnsupportedFeature("1024-bit mask".to_string()).into();
        assert!(matches!(err, sabre_platform::SabreError::Unsupported(_)));

        let err: sabre_platform::SabreError =
            BuilderError::InvalidParameter("bad key length".to_string()).into();
        assert!(matches!(
            err,
            sabre_platform::SabreError::InvalidParameter(_)
        ));
    }
}
