//! Configuration module for escrelay-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{IngestConfig, ServerConfig, SharedConfig, StreamConfig};
use escrelay_core::config::{MAX_BACKLOG, MAX_SUBSCRIBER_CAPACITY};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("no ingest secret configured (set [ingest] secret or ESCRELAY_INGEST_SECRET)")]
    MissingIngestSecret,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub stream: StreamConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.ingest, self.stream)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
    secret_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        secret_override: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            secret_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI / environment overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let file_config: FileConfig = toml::from_str(&config_content)?;
        self.process(file_config)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn process(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(secret) = &self.secret_override {
            file_config.ingest.secret = Some(secret.clone());
        }

        validate(&file_config)?;

        let secret = file_config
            .ingest
            .secret
            .ok_or(ConfigError::MissingIngestSecret)?;

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            ingest: IngestConfig::new(secret.into_bytes()),
            stream: StreamConfig {
                subscriber_capacity: file_config.stream.subscriber_capacity,
                backlog: file_config.stream.backlog,
                keep_alive: Duration::from_secs(file_config.stream.keep_alive_secs),
            },
        })
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    match config.ingest.secret.as_deref() {
        None => return Err(ConfigError::MissingIngestSecret),
        Some(secret) if secret.trim().is_empty() => {
            return Err(ConfigError::ValidationError(
                "ingest secret must not be empty".to_string(),
            ));
        }
        Some(_) => {}
    }
    if config.stream.subscriber_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "stream.subscriber_capacity must be at least 1".to_string(),
        ));
    }
    if config.stream.subscriber_capacity > MAX_SUBSCRIBER_CAPACITY {
        return Err(ConfigError::ValidationError(format!(
            "stream.subscriber_capacity must be at most {MAX_SUBSCRIBER_CAPACITY}"
        )));
    }
    if config.stream.backlog > MAX_BACKLOG {
        return Err(ConfigError::ValidationError(format!(
            "stream.backlog must be at most {MAX_BACKLOG}"
        )));
    }
    if config.stream.keep_alive_secs == 0 {
        return Err(ConfigError::ValidationError(
            "stream.keep_alive_secs must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(secret_override: Option<&str>) -> ConfigLoader {
        ConfigLoader::new(
            "/nonexistent/escrelay.toml",
            None,
            secret_override.map(str::to_string),
        )
    }

    #[test]
    fn test_process_builds_runtime_config() {
        let file: FileConfig = toml::from_str(
            r#"
[ingest]
secret = "s3cret"

[stream]
keep_alive_secs = 30
"#,
        )
        .unwrap();
        let loaded = loader(None).process(file).unwrap();
        assert_eq!(loaded.ingest.secret_bytes(), b"s3cret");
        assert_eq!(loaded.stream.keep_alive, Duration::from_secs(30));
        assert_eq!(loaded.stream.subscriber_capacity, 256);
        assert_eq!(loaded.server.listen.port(), 8080);
    }

    #[test]
    fn test_overrides_win() {
        let file: FileConfig = toml::from_str("[ingest]\nsecret = \"from-file\"\n").unwrap();
        let loader = ConfigLoader::new(
            "/nonexistent/escrelay.toml",
            Some("127.0.0.1:9999".parse().unwrap()),
            Some("from-env".to_string()),
        );
        let loaded = loader.process(file).unwrap();
        assert_eq!(loaded.server.listen.port(), 9999);
        assert_eq!(loaded.ingest.secret_bytes(), b"from-env");
    }

    #[test]
    fn test_secret_required() {
        let err = loader(None).process(FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingIngestSecret));

        let err = loader(Some("  ")).process(FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        assert!(loader(Some("ok")).process(FileConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let file: FileConfig =
            toml::from_str("[stream]\nsubscriber_capacity = 0\n").unwrap();
        let err = loader(Some("ok")).process(file).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_oversized_stream_limits_rejected() {
        let file: FileConfig =
            toml::from_str("[stream]\nsubscriber_capacity = 4611686018427387904\n").unwrap();
        let err = loader(Some("ok")).process(file).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("subscriber_capacity")));

        let file: FileConfig = toml::from_str("[stream]\nbacklog = 1000001\n").unwrap();
        let err = loader(Some("ok")).process(file).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("backlog")));

        let file: FileConfig = toml::from_str(&format!(
            "[stream]\nsubscriber_capacity = {MAX_SUBSCRIBER_CAPACITY}\nbacklog = {MAX_BACKLOG}\n"
        ))
        .unwrap();
        assert!(loader(Some("ok")).process(file).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = loader(Some("ok")).load().unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
