/// Errors from loading or validating client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = ConfigError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue("timeoutMs must be positive".into());
        assert_eq!(err.to_string(), "invalid config value: timeoutMs must be positive");
    }
}
