//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_runtime(config, &mut result);
        Self::validate_writer(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_runtime(config: &Config, result: &mut ValidationResult) {
        let runtime = &config.runtime;

        if runtime.run_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "runtime.run_timeout_secs",
                "run_timeout_secs must be greater than 0",
            ));
        }

        for (path, value) in [
            ("runtime.event_max_chars", runtime.event_max_chars),
            ("runtime.event_max_items", runtime.event_max_items),
            ("runtime.stream_max_chars", runtime.stream_max_chars),
            ("runtime.stream_max_items", runtime.stream_max_items),
        ] {
            if value == 0 {
                result.add_error(ValidationError::new(path, "limit must be greater than 0"));
            }
        }

        if runtime.stream_max_chars > runtime.event_max_chars {
            result.add_warning(ValidationWarning::new(
                "runtime.stream_max_chars",
                "streamed payloads are allowed to be larger than persisted ones",
            ));
        }
    }

    fn validate_writer(config: &Config, result: &mut ValidationResult) {
        let writer = &config.writer;

        if writer.queue_capacity == 0 {
            result.add_error(ValidationError::new(
                "writer.queue_capacity",
                "queue_capacity must be greater than 0",
            ));
        }

        if writer.base_delay_ms > writer.max_delay_ms {
            result.add_error(ValidationError::new(
                "writer.base_delay_ms",
                "base_delay_ms cannot exceed max_delay_ms",
            ));
        }

        if writer.max_retries > 10 {
            result.add_warning(ValidationWarning::new(
                "writer.max_retries",
                "max_retries is very high (>10), status updates may lag far behind",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
