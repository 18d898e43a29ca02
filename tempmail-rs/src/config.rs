use crate::error::{MailError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides, e.g. `TEMPMAIL__API__LISTEN_ADDR`
const ENV_PREFIX: &str = "TEMPMAIL";

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX).separator("__")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub domains: Vec<DomainSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Address every per-domain listener binds to; the port comes from the domain
    pub bind_addr: String,
    pub max_message_size: usize,
    pub idle_timeout_secs: u64,
    /// Reject RCPT with 452 once a domain reached its quota
    pub enforce_quota: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub cleanup_interval_secs: u64,
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "compact" or "json"
    pub format: String,
}

/// Initial domain definition, copied into the registry on first start
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainSeed {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_max_accepted")]
    pub max_accepted: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_accepted() -> u64 {
    100
}

fn default_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            max_message_size: 10_240_000,
            idle_timeout_secs: 300,
            enforce_quota: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 3600,
            retention_secs: 24 * 3600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "tempmail_rs=info,tower_http=info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load a TOML file, then apply `TEMPMAIL__SECTION__KEY` environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MailError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        Self::layered(
            config::File::from(path).format(config::FileFormat::Toml),
            env_source(),
        )
    }

    /// `base` with the `TEMPMAIL__SECTION__KEY` environment overrides applied
    pub fn with_env_overrides(base: &Config) -> Result<Self> {
        Self::layered(config::Config::try_from(base)?, env_source())
    }

    fn layered<S>(base: S, env: config::Environment) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(base)
            .add_source(env)
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Single-domain configuration for local development
    pub fn development() -> Self {
        Self {
            domains: vec![DomainSeed {
                name: "mail.localhost".to_string(),
                port: 2525,
                max_accepted: default_max_accepted(),
                enabled: true,
            }],
            ..Self::default()
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MailError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.retention.cleanup_interval_secs == 0 {
            return Err(MailError::Config(
                "retention.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.smtp.idle_timeout_secs == 0 {
            return Err(MailError::Config(
                "smtp.idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        Path::new(&self.storage.data_dir).join("domains.json")
    }

    pub fn messages_path(&self) -> PathBuf {
        Path::new(&self.storage.data_dir).join("emails.json")
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.retention.cleanup_interval_secs)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention.retention_secs)
    }
}
