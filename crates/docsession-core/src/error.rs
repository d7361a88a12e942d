/// Core error types for docsession.
#[derive(Debug, thiserror::Error)]
pub enum DocsessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures reported by a document store. These are surfaced to the caller
/// unchanged; the session handler never retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document id: {0}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, DocsessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn read_missing() -> Result<Vec<u8>> {
        let bytes = std::fs::read("/nonexistent/docsession/doc.json").map_err(StoreError::from)?;
        Ok(bytes)
    }

    #[test]
    fn test_store_errors_wrap_into_top_level() {
        assert!(matches!(read_missing(), Err(DocsessionError::Store(StoreError::Io(_)))));

        let bad: std::result::Result<u8, _> = serde_json::from_str("{");
        let err = DocsessionError::from(StoreError::from(bad.unwrap_err()));
        assert!(err.to_string().starts_with("Store error: Failed to (de)serialize document"));

        let err = DocsessionError::from(ConfigError::Invalid("unknown backend: tape".into()));
        assert_eq!(err.to_string(), "Configuration error: Invalid config: unknown backend: tape");
    }
}
