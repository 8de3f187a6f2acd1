//! Error types for sabre

use std::fmt;

/// Unified error type for all sabre operations
#[derive(Debug)]
pub enum SabreError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// A parameter combination the builders reject
    InvalidParameter(String),

    /// A feature the configured hardware cannot perform
    Unsupported(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for SabreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SabreError::Io(e) => write!(f, "IO error: {}", e),
            SabreError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SabreError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            SabreError::Unsupported(msg) => write!(f, "Unsupported feature: {}", msg),
            SabreError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for SabreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SabreError::Io(e) => Some(e),
            SabreError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SabreError {
    fn from(err: std::io::Error) -> Self {
        SabreError::Io(err)
    }
}

/// Result type for sabre operations
pub type SabreResult<T> = Result<T, SabreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SabreError::Config("Invalid configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let sabre_err: SabreError = io_err.into();
        assert!(matches!(sabre_err, SabreError::Io(_)));
    }

    #[test]
    fn test_result_type() {
        fn example() -> SabreResult<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
