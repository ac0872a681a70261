use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;
use crate::{log_system_event, log_validation};

const DEFAULT_DATABASE_URL: &str = "sqlite:study_companion.db";
const DEFAULT_LOG_LEVEL: &str = "info,study_companion=debug";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const PLACEHOLDER_API_KEY: &str = "your-api-key";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub llm: LLMConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
}

/// Generation service configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub provider: LLMProviderType,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// `None` disables the timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading configuration from environment variables");

        let config = Config {
            storage: StorageConfig::from_env(),
            llm: LLMConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env(),
        };

        log_system_event!(config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Log a summary of the configuration with secrets masked
    pub fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.storage.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            llm_timeout = ?self.llm.timeout,
            server_address = %self.server.address(),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    pub fn validate(&self) -> Result<()> {
        if !self.storage.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.llm.provider.requires_api_key()
            && (self.llm.api_key.is_empty() || self.llm.api_key == PLACEHOLDER_API_KEY)
        {
            warn!(
                provider = ?self.llm.provider,
                "LLM API key appears to be placeholder or empty - study modules will use the local fallback"
            );
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl StorageConfig {
    fn from_env() -> Self {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        StorageConfig { url }
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let provider_label = env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        let provider = LLMProviderType::from_label(&provider_label).unwrap_or_else(|| {
            info!("Unknown LLM provider '{}', defaulting to Ollama", provider_label);
            LLMProviderType::Ollama
        });

        let api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| PLACEHOLDER_API_KEY.to_string());
        let base_url = env::var("LLM_BASE_URL").ok().filter(|url| !url.trim().is_empty());
        let model = env::var("LLM_MODEL").ok().filter(|model| !model.trim().is_empty());

        let timeout_str =
            env::var("LLM_TIMEOUT_SECS").unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string());
        let timeout_secs = timeout_str.parse::<u64>().map_err(|_| {
            anyhow!("Invalid LLM_TIMEOUT_SECS value: '{}'. Must be a whole number of seconds", timeout_str)
        })?;
        let timeout = (timeout_secs > 0).then_some(Duration::from_secs(timeout_secs));

        Ok(LLMConfig {
            provider,
            api_key,
            base_url,
            model,
            timeout,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        Ok(ServerConfig { host, port })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let file_enabled = parse_flag("LOG_FILE_ENABLED", true);
        let console_enabled = parse_flag("LOG_CONSOLE_ENABLED", true);
        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        }
    }
}

fn parse_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<bool>().ok())
        .unwrap_or(default)
}

/// Mask sensitive data for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
