//! Engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid workflow import: {0}")]
    InvalidImport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_import_display() {
        let err = EngineError::InvalidImport("missing name".to_string());
        assert!(err.to_string().contains("missing name"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = EngineError::from(io_err);
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = EngineError::from(json_err);
        assert!(err.to_string().contains("JSON"));
    }
}
