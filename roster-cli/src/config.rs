use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete runtime configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bamboohr: BambooHrSettings,
    pub moodle: MoodleSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BambooHrSettings {
    /// Company subdomain, as in `https://{company_domain}.bamboohr.com`
    pub company_domain: String,
    /// Where the API key lives: `arn:aws:secretsmanager:…`, `file:<path>` or `env:<VAR>`
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodleSettings {
    pub base_url: String,
    /// Where the web-service token lives; same forms as `bamboohr.secret`
    pub secret: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    #[serde(default)]
    pub default_institution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Records reconciled per run; zero or negative means the whole page
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_lookback_days")]
    pub initial_lookback_days: i64,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Retry budget for source reads; zero disables retries
    #[serde(default = "default_retry_max_elapsed", with = "humantime_serde")]
    pub retry_max_elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_table")]
    pub dynamodb_table: String,
    #[serde(default = "default_state_id")]
    pub state_id: String,
    /// Keep the cursor in this local file instead of DynamoDB
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Additional JSON log file
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Rotation of `file`: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bamboohr: BambooHrSettings {
                company_domain: "example".to_string(),
                secret: "env:BAMBOOHR_SECRET".to_string(),
            },
            moodle: MoodleSettings {
                base_url: "https://lms.example.com".to_string(),
                secret: "env:MOODLE_SECRET".to_string(),
                auth_method: default_auth_method(),
                default_institution: None,
            },
            sync: SyncSettings::default(),
            http: HttpConfig::default(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            initial_lookback_days: default_lookback_days(),
            dry_run: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            retry_max_elapsed: default_retry_max_elapsed(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dynamodb_table: default_state_table(),
            state_id: default_state_id(),
            file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
            rotation: default_log_rotation(),
        }
    }
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from `lookup`, which maps a variable name to
    /// its value. Unset variables and unparseable numbers use the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let int = |name: &str, default: i64| {
            text(name)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };
        let seconds = |name: &str, default: Duration| {
            text(name)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            bamboohr: BambooHrSettings {
                company_domain: text("BAMBOO_COMPANY_DOMAIN").unwrap_or_default(),
                secret: text("BAMBOO_SECRET_ARN").unwrap_or_default(),
            },
            moodle: MoodleSettings {
                base_url: text("MOODLE_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_default(),
                secret: text("MOODLE_SECRET_ARN").unwrap_or_default(),
                auth_method: text("MOODLE_AUTH").unwrap_or_else(default_auth_method),
                default_institution: text("MOODLE_DEFAULT_INSTITUTION"),
            },
            sync: SyncSettings {
                batch_size: int("BATCH_SIZE", default_batch_size()),
                initial_lookback_days: int("INITIAL_LOOKBACK_DAYS", default_lookback_days()),
                dry_run: text("DRY_RUN").map(|v| parse_flag(&v)).unwrap_or(false),
            },
            http: HttpConfig {
                timeout: seconds("HTTP_TIMEOUT_SECONDS", default_http_timeout()),
                retry_max_elapsed: seconds("RETRY_MAX_ELAPSED_SECONDS", default_retry_max_elapsed()),
            },
            state: StateConfig {
                dynamodb_table: text("DDB_TABLE").unwrap_or_else(default_state_table),
                state_id: text("STATE_ID").unwrap_or_else(default_state_id),
                file: text("STATE_FILE").map(PathBuf::from),
            },
            logging: LoggingConfig {
                level: text("LOG_LEVEL").unwrap_or_else(default_log_level),
                format: match text("LOG_FORMAT").as_deref() {
                    Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                    _ => LogFormat::Pretty,
                },
                file: text("LOG_FILE").map(PathBuf::from),
                rotation: text("LOG_ROTATION").unwrap_or_else(default_log_rotation),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bamboohr.company_domain.trim().is_empty() {
            anyhow::bail!("BambooHR company domain cannot be empty");
        }

        let moodle_url = url::Url::parse(&self.moodle.base_url)
            .with_context(|| format!("Invalid Moodle base URL: {:?}", self.moodle.base_url))?;
        if !matches!(moodle_url.scheme(), "http" | "https") {
            anyhow::bail!("Moodle base URL must be http or https: {}", self.moodle.base_url);
        }

        if self.moodle.auth_method.trim().is_empty() {
            anyhow::bail!("Moodle auth method cannot be empty");
        }
        if self.state.file.is_none() && self.state.dynamodb_table.trim().is_empty() {
            anyhow::bail!("Either a state file or a DynamoDB table must be configured");
        }
        if self.state.state_id.trim().is_empty() {
            anyhow::bail!("State id cannot be empty");
        }
        if self.http.timeout.is_zero() {
            anyhow::bail!("HTTP timeout must be greater than zero");
        }
        if !matches!(self.logging.rotation.as_str(), "daily" | "hourly" | "never") {
            anyhow::bail!("Log rotation must be daily, hourly or never: {}", self.logging.rotation);
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// Default value functions
fn default_auth_method() -> String { "oidc".to_string() }
fn default_batch_size() -> i64 { 100 }
fn default_lookback_days() -> i64 { 14 }
fn default_http_timeout() -> Duration { Duration::from_secs(30) }
fn default_retry_max_elapsed() -> Duration { Duration::from_secs(30) }
fn default_state_table() -> String { "bamboohr-moodle-sync-state".to_string() }
fn default_state_id() -> String { "default".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_rotation() -> String { "never".to_string() }
