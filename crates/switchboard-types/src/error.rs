use thiserror::Error;

/// Errors from configuration stores and audit sinks.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

/// Errors loading the `config.toml` file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("invalid provider entry '{id}': {message}")]
    InvalidProvider { id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidProvider {
            id: "p1".to_string(),
            message: "provider kind must not be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid provider entry 'p1': provider kind must not be empty"
        );
    }
}
