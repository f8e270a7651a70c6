pub const SECRET_NAME_ENV: &str = "SECRET_NAME";
pub const LOG_STREAM_NAME_ENV: &str = "AWS_LAMBDA_LOG_STREAM_NAME";
pub const UNKNOWN_LOG_STREAM: &str = "unknown";

/// Handler settings read from the function environment.
///
/// The secret id is kept optional here: only Create and Update need it, and a
/// missing value must never block a Delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    secret_id: Option<String>,
    pub log_stream_name: String,
}

impl HandlerConfig {
    pub fn new(secret_id: Option<String>, log_stream_name: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            log_stream_name: log_stream_name.into(),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_stream_name = lookup(LOG_STREAM_NAME_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LOG_STREAM.to_string());
        Self::new(lookup(SECRET_NAME_ENV), log_stream_name)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn secret_id(&self) -> Result<&str, ConfigError> {
        self.secret_id
            .as_deref()
            .ok_or_else(|| ConfigError::new(format!("{SECRET_NAME_ENV} must be configured")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}
