use thiserror::Error;

/// Failure to produce a usable [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file at {0}")]
    NotFound(String),

    /// Rejected by [`ConfigValidator`](crate::ConfigValidator).
    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("configuration references unset variable ${{{0}}}")]
    EnvVarNotSet(String),

    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let err = ConfigError::NotFound("/etc/flowhands.toml".to_string());
        assert_eq!(err.to_string(), "no configuration file at /etc/flowhands.toml");

        let err = ConfigError::InvalidValue {
            field: "writer.queue_capacity".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(err.to_string(), "writer.queue_capacity: must be at least 1");

        let err = ConfigError::EnvVarNotSet("FLOWHANDS_DB".to_string());
        assert_eq!(
            err.to_string(),
            "configuration references unset variable ${FLOWHANDS_DB}"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: ConfigError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
