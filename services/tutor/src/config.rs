use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tutor_client::{
    CredentialProvider, FileCredentialProvider, ReconnectPolicy, SessionOptions,
    StaticCredentialProvider,
};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where the bearer token comes from.
#[derive(Clone, Debug)]
pub enum CredentialSource {
    /// Re-read before every request, so it can be rotated externally.
    File(PathBuf),
    Token(SecretString),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub credential: CredentialSource,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay: Duration,
    pub assessment_feedback: bool,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_base_url = std::env::var("TUTOR_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080/api".to_string());
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "TUTOR_API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let credential = match (
            std::env::var("TUTOR_TOKEN_FILE").ok(),
            std::env::var("TUTOR_TOKEN").ok(),
        ) {
            (Some(path), _) if !path.trim().is_empty() => CredentialSource::File(PathBuf::from(path)),
            (_, Some(token)) if !token.trim().is_empty() => {
                CredentialSource::Token(SecretString::from(token))
            }
            _ => {
                return Err(ConfigError::MissingVar(
                    "TUTOR_TOKEN_FILE or TUTOR_TOKEN must be set".to_string(),
                ));
            }
        };

        let reconnect_max_attempts = parse_var("RECONNECT_MAX_ATTEMPTS", 3u32)?;
        let reconnect_delay = Duration::from_millis(parse_var("RECONNECT_DELAY_MS", 1000u64)?);
        let assessment_feedback = parse_var("TUTOR_ASSESSMENT_FEEDBACK", false)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_base_url,
            credential,
            reconnect_max_attempts,
            reconnect_delay,
            assessment_feedback,
            log_level,
        })
    }

    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        match &self.credential {
            CredentialSource::File(path) => Arc::new(FileCredentialProvider::new(path.clone())),
            CredentialSource::Token(token) => Arc::new(StaticCredentialProvider::new(token.clone())),
        }
    }

    pub fn session_options(&self, load_history: bool) -> SessionOptions {
        SessionOptions {
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_max_attempts,
                delay: self.reconnect_delay,
            },
            assessment_feedback: self.assessment_feedback,
            load_history,
            ..Default::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("TUTOR_API_BASE_URL");
            env::remove_var("TUTOR_TOKEN_FILE");
            env::remove_var("TUTOR_TOKEN");
            env::remove_var("RECONNECT_MAX_ATTEMPTS");
            env::remove_var("RECONNECT_DELAY_MS");
            env::remove_var("TUTOR_ASSESSMENT_FEEDBACK");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("TUTOR_TOKEN", "test-token");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        match &config.credential {
            CredentialSource::Token(token) => assert_eq!(token.expose_secret(), "test-token"),
            other => panic!("Expected a token credential, got {:?}", other),
        }
        assert_eq!(config.reconnect_max_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
        assert!(!config.assessment_feedback);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("TUTOR_API_BASE_URL", "https://tutor.example.com/api");
            env::set_var("TUTOR_TOKEN_FILE", "/run/secrets/tutor-token");
            env::set_var("TUTOR_TOKEN", "ignored-when-file-is-set");
            env::set_var("RECONNECT_MAX_ATTEMPTS", "5");
            env::set_var("RECONNECT_DELAY_MS", "250");
            env::set_var("TUTOR_ASSESSMENT_FEEDBACK", "true");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.api_base_url, "https://tutor.example.com/api");
        match &config.credential {
            CredentialSource::File(path) => {
                assert_eq!(path, &PathBuf::from("/run/secrets/tutor-token"))
            }
            other => panic!("Expected a file credential, got {:?}", other),
        }
        let options = config.session_options(false);
        assert_eq!(options.reconnect.max_attempts, 5);
        assert_eq!(options.reconnect.delay, Duration::from_millis(250));
        assert!(options.assessment_feedback);
        assert!(!options.load_history);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_credential() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("TUTOR_TOKEN")),
            _ => panic!("Expected MissingVar for the credential"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_attempts() {
        clear_env_vars();
        unsafe {
            env::set_var("TUTOR_TOKEN", "test-token");
            env::set_var("RECONNECT_MAX_ATTEMPTS", "many");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RECONNECT_MAX_ATTEMPTS"),
            _ => panic!("Expected InvalidValue for RECONNECT_MAX_ATTEMPTS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_base_url_and_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("TUTOR_TOKEN", "test-token");
            env::set_var("TUTOR_API_BASE_URL", "localhost:8080");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TUTOR_API_BASE_URL"),
            _ => panic!("Expected InvalidValue for TUTOR_API_BASE_URL"),
        }

        unsafe {
            env::remove_var("TUTOR_API_BASE_URL");
            env::set_var("RUST_LOG", "not-a-level");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
