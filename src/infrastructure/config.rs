//! Configuration infrastructure
//!
//! Configuration for the occupancy sync backend, persisted as a JSON file.
//! Credentials are never written to the file with real values by default;
//! they can be supplied through `PLATFORM_USERNAME` / `PLATFORM_PASSWORD`
//! environment variables, which override whatever the file carries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Upstream platform endpoints, credentials and pagination contract
    pub platform: PlatformConfig,

    /// Sync cycle behavior (timeouts, guard cooldown, policy knobs)
    pub sync: SyncConfig,

    /// Snapshot / master record database
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream platform access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform origin, e.g. "https://platform.inzhiyu.com"
    pub base_url: String,

    /// Login page path (cookie bootstrap + access key source)
    pub login_path: String,

    /// Login form submit path
    pub login_submit_path: String,

    /// Guest list endpoint path
    pub guests_list_path: String,

    /// Authorization-check endpoint path
    pub auth_check_path: String,

    /// Account credentials (overridable via environment)
    pub username: String,
    pub password: String,

    /// Contract the guest list is scoped to
    pub contract_id: i64,
    pub contract_type: i64,

    /// Page size for the paginated list endpoint
    pub page_size: u32,

    /// Cookies that must all be present before the session is usable
    pub required_cookies: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://platform.inzhiyu.com".to_string(),
            login_path: "/#/login".to_string(),
            login_submit_path: "/ams/api/login".to_string(),
            guests_list_path: "/ams/api/contractEnterprise/guestsList".to_string(),
            auth_check_path: "/ams/api/auth/check".to_string(),
            username: String::new(),
            password: String::new(),
            contract_id: 1489,
            contract_type: 3,
            page_size: 50,
            required_cookies: vec![
                "_ams_token".to_string(),
                "_common_token".to_string(),
                "_user_id".to_string(),
                "_tenant_id".to_string(),
            ],
        }
    }
}

/// Sync cycle behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Deadline for the authentication poll loop, in seconds
    pub auth_timeout_seconds: u64,

    /// Re-check interval inside the authentication poll loop, in milliseconds
    pub auth_poll_interval_ms: u64,

    /// HTTP request timeout, in seconds
    pub request_timeout_seconds: u64,

    /// Trigger guard cooldown window, in seconds. The guard expires after
    /// this window even if the cycle never released it.
    pub trigger_cooldown_seconds: u64,

    /// Abort the cycle when pagination ends on a transport error instead of
    /// synchronizing the partial list. Off by default: the partial list is
    /// accepted and the shortfall shows up in the extraction statistics.
    pub abort_on_short_page: bool,

    /// Directory for diagnostics artifacts (stats, sample, auth failures)
    pub diagnostics_dir: PathBuf,

    /// Maximum number of records kept in the diagnostics sample file
    pub sample_cap: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auth_timeout_seconds: 15,
            auth_poll_interval_ms: 1200,
            request_timeout_seconds: 30,
            trigger_cooldown_seconds: 300,
            abort_on_short_page: false,
            diagnostics_dir: PathBuf::from("logs"),
            sample_cap: 20,
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. "sqlite:data/tenant-sync.db"
    pub url: String,

    /// Maximum pool connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/tenant-sync.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log file directory
    pub log_dir: PathBuf,

    /// Module-specific log level filters (e.g. "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "info".to_string());
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
            module_filters,
        }
    }
}

/// Loads and saves the application configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("tenant-sync");
        Ok(Self {
            config_path: config_dir.join("config.json"),
        })
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from file, creating the default if it doesn't
    /// exist, then apply environment overrides for credentials.
    pub async fn load_config(&self) -> Result<AppConfig> {
        let mut config = if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)
                .await
                .context("Failed to read configuration file")?;
            serde_json::from_str::<AppConfig>(&content)
                .with_context(|| format!("Invalid configuration file: {:?}", self.config_path))?
        } else {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            default_config
        };

        if let Ok(username) = std::env::var("PLATFORM_USERNAME") {
            config.platform.username = username;
        }
        if let Ok(password) = std::env::var("PLATFORM_PASSWORD") {
            config.platform.password = password;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

impl PlatformConfig {
    /// Join a configured path onto the platform origin.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
