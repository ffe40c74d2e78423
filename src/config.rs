use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::grading_service::GradingSettings;
use crate::llm_providers::LLMProviderType;
use crate::webhook_service::DeliverySettings;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub grading: GradingConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Grading engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
}

/// Batch grading policy: concurrency, retries and per-attempt timeout
#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    pub max_parallel_tasks: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

/// Callback delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub callback_url: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            server: ServerConfig::from_env()?,
            llm: LLMConfig::from_env()?,
            grading: GradingConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            callback_url = %self.webhook.callback_url,
            max_parallel_tasks = self.grading.max_parallel_tasks,
            max_retries = self.grading.max_retries,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.grading.max_parallel_tasks == 0 {
            return Err(anyhow!("MAX_PARALLEL_TASKS must be greater than 0"));
        }

        if self.grading.max_retries == 0 {
            return Err(anyhow!("MAX_RETRIES must be greater than 0"));
        }

        if !self.webhook.callback_url.starts_with("http://")
            && !self.webhook.callback_url.starts_with("https://")
        {
            return Err(anyhow!(
                "FINAL_WEBHOOK_URL must be an http(s) URL, got '{}'",
                self.webhook.callback_url
            ));
        }

        if self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key" {
            warn!("LLM API key appears to be placeholder or empty - grading calls may not work");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }

    pub fn grading_settings(&self) -> GradingSettings {
        GradingSettings {
            max_retries: self.grading.max_retries,
            retry_delay: Duration::from_secs(self.grading.retry_delay_secs),
            request_timeout: Duration::from_secs(self.grading.request_timeout_secs),
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            max_retries: self.webhook.max_retries,
            retry_delay: Duration::from_secs(self.webhook.retry_delay_secs),
            request_timeout: Duration::from_secs(self.webhook.request_timeout_secs),
        }
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!(
                "Invalid PORT value: '{}'. Must be a number between 1-65535",
                port_str
            )
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());

        let base_url = env::var("LLM_BASE_URL").ok();

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());

        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" | "google" => LLMProviderType::Gemini,
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to OpenAI", provider_str);
                LLMProviderType::OpenAI
            }
        };

        let model = env::var("LLM_MODEL").ok();

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
        })
    }
}

impl GradingConfig {
    fn from_env() -> Result<Self> {
        Ok(GradingConfig {
            max_parallel_tasks: parse_env_number("MAX_PARALLEL_TASKS", 4)?,
            max_retries: parse_env_number("MAX_RETRIES", 3)?,
            retry_delay_secs: parse_env_number("RETRY_DELAY", 2)?,
            request_timeout_secs: parse_env_number("REQUEST_TIMEOUT", 120)?,
        })
    }
}

impl WebhookConfig {
    fn from_env() -> Result<Self> {
        let callback_url = env::var("FINAL_WEBHOOK_URL")
            .unwrap_or_else(|_| "https://n8nyti.duckdns.org/webhook/final_grade".to_string());

        Ok(WebhookConfig {
            callback_url,
            max_retries: parse_env_number("MAX_RETRIES", 3)?,
            retry_delay_secs: parse_env_number("RETRY_DELAY", 2)?,
            request_timeout_secs: parse_env_number("WEBHOOK_TIMEOUT", 30)?,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,grading_webhook=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

fn parse_env_number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a number", name, value)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
            },
            llm: LLMConfig {
                api_key: "sk-valid-key".to_string(),
                base_url: None,
                provider: LLMProviderType::OpenAI,
                model: None,
            },
            grading: GradingConfig {
                max_parallel_tasks: 4,
                max_retries: 3,
                retry_delay_secs: 2,
                request_timeout_secs: 120,
            },
            webhook: WebhookConfig {
                callback_url: "https://example.com/webhook/final_grade".to_string(),
                max_retries: 3,
                retry_delay_secs: 2,
                request_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_config_validation() {
        let config = test_config();
        assert!(config.validate().is_ok());

        let mut invalid = test_config();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = test_config();
        invalid.grading.max_parallel_tasks = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = test_config();
        invalid.webhook.callback_url = "not-a-url".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let config = test_config();

        let grading = config.grading_settings();
        assert_eq!(grading.max_retries, 3);
        assert_eq!(grading.retry_delay, Duration::from_secs(2));
        assert_eq!(grading.request_timeout, Duration::from_secs(120));

        let delivery = config.delivery_settings();
        assert_eq!(delivery.max_retries, 3);
        assert_eq!(delivery.retry_delay, Duration::from_secs(2));
        assert_eq!(delivery.request_timeout, Duration::from_secs(30));
    }
}
