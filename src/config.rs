use crate::calendar::{
    default_reminders, CalendarColorPolicy, ComposerSettings, ErrorKind, EventTemplate,
    RecurrenceStrategy, RetryPolicy, TemplateCatalog, Warning, DEFAULT_CALENDAR,
    DEFAULT_RECURRENCE_CAP,
};
use crate::services::google::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URI};
use crate::services::ReminderOverride;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const CONFIG_PATH_VAR: &str = "GCAL_MANAGER_CONFIG";
pub const LOG_FILE_VAR: &str = "GCAL_MANAGER_LOG_FILE";
pub const DEFAULT_LOG_FILE: &str = "logs/gcal_manager.log";
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// Problems found while turning the configuration into runtime values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("Invalid color configuration: {0}")]
    InvalidColor(String),
    #[error("Invalid template '{name}': {reason}")]
    InvalidTemplate { name: String, reason: String },
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Invalid environment variable {var}: {reason}")]
    InvalidEnv { var: String, reason: String },
    #[error("Failed to determine config directory")]
    NoConfigDir,
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidFormat
    }

    fn value(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue { key: key.to_string(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceMode {
    #[default]
    Native,
    Materialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub colors: ColorsConfig,
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateConfig>,
    #[serde(default = "default_reminders")]
    pub reminders: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub default_calendar: String,
    pub default_timezone: String,
    pub recurrence_mode: RecurrenceMode,
    pub recurrence_cap: usize,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_calendar: DEFAULT_CALENDAR.to_string(),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            recurrence_mode: RecurrenceMode::Native,
            recurrence_cap: DEFAULT_RECURRENCE_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub token_uri: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: Some(PathBuf::from(DEFAULT_LOG_FILE)) }
    }
}

/// Calendar (id or name) to hex color, and hex color to provider color id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub calendars: BTreeMap<String, String>,
    pub color_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(
            "Meeting".to_string(),
            TemplateConfig {
                summary: Some("Meeting".to_string()),
                duration_minutes: Some(30),
                ..TemplateConfig::default()
            },
        );
        Self {
            calendar: CalendarConfig::default(),
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            colors: ColorsConfig::default(),
            templates,
            reminders: default_reminders(),
        }
    }
}

/// Validated, typed configuration used at runtime
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub timezone: Tz,
    pub policy: CalendarColorPolicy,
    pub templates: TemplateCatalog,
    pub strategy: RecurrenceStrategy,
    /// Occurrence limit for open-ended rules expanded locally
    pub recurrence_cap: usize,
    pub composer: ComposerSettings,
    pub base_url: Url,
    pub token_uri: String,
    pub log_file: Option<PathBuf>,
    /// Non-fatal problems, such as calendars with an unmapped color
    pub warnings: Vec<Warning>,
}

impl Config {
    /// Load from `GCAL_MANAGER_CONFIG` or the per-user config directory
    pub fn load() -> Result<Self> {
        let path = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => get_config_path()?,
        };
        Self::load_from(&path)
    }

    /// Load from `path`, writing the defaults there first if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Config::default();
            default_config.save_to(path)?;
            debug!("Created default config at {}", path.display());
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Layer `DEFAULT_TIMEZONE`, `CALENDAR_NAMES`, `COLOR_MAP`,
    /// `EVENT_TEMPLATES` and `GCAL_MANAGER_LOG_FILE` over the file values.
    /// The JSON maps are merged key by key.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(tz) = lookup("DEFAULT_TIMEZONE") {
            self.calendar.default_timezone = tz.trim().to_string();
        }
        if let Some(json) = lookup("CALENDAR_NAMES") {
            self.colors.calendars.extend(parse_json_var::<String>("CALENDAR_NAMES", &json)?);
        }
        if let Some(json) = lookup("COLOR_MAP") {
            self.colors.color_ids.extend(parse_json_var::<String>("COLOR_MAP", &json)?);
        }
        if let Some(json) = lookup("EVENT_TEMPLATES") {
            self.templates.extend(parse_json_var::<TemplateConfig>("EVENT_TEMPLATES", &json)?);
        }
        if let Some(file) = lookup(LOG_FILE_VAR) {
            self.logging.file = Some(PathBuf::from(file.trim()));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<RuntimeSettings, ConfigError> {
        let timezone: Tz = self
            .calendar
            .default_timezone
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.calendar.default_timezone.clone()))?;

        let policy = CalendarColorPolicy::from_maps(&self.colors.calendars, &self.colors.color_ids)
            .map_err(|e| ConfigError::InvalidColor(e.to_string()))?;

        let mut templates = Vec::with_capacity(self.templates.len());
        for (name, template) in &self.templates {
            let resolved =
                EventTemplate::new(name, template.summary.as_deref(), template.duration_minutes)
                    .map_err(|e| ConfigError::InvalidTemplate {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?
                    .with_description(template.description.clone())
                    .with_color(template.color_id.clone());
            templates.push(resolved);
        }

        if self.calendar.recurrence_cap == 0 {
            return Err(ConfigError::value("calendar.recurrence_cap", "must be at least 1"));
        }
        let strategy = match self.calendar.recurrence_mode {
            RecurrenceMode::Native => RecurrenceStrategy::Native,
            RecurrenceMode::Materialized => {
                RecurrenceStrategy::Materialized { cap: self.calendar.recurrence_cap }
            }
        };

        let service = &self.service;
        if service.workers == 0 {
            return Err(ConfigError::value("service.workers", "must be at least 1"));
        }
        if service.max_attempts == 0 {
            return Err(ConfigError::value("service.max_attempts", "must be at least 1"));
        }
        if service.timeout_secs == 0 {
            return Err(ConfigError::value("service.timeout_secs", "must be at least 1"));
        }
        let base_url = Url::parse(&service.base_url)
            .map_err(|e| ConfigError::value("service.base_url", e.to_string()))?;
        Url::parse(&service.token_uri)
            .map_err(|e| ConfigError::value("service.token_uri", e.to_string()))?;

        let default_calendar = self.calendar.default_calendar.trim();
        if default_calendar.is_empty() {
            return Err(ConfigError::value("calendar.default_calendar", "must not be empty"));
        }

        let warnings = policy.incomplete_calendars();
        for warning in &warnings {
            warn!("{}", warning);
        }

        Ok(RuntimeSettings {
            timezone,
            templates: TemplateCatalog::new(templates),
            strategy,
            recurrence_cap: self.calendar.recurrence_cap,
            composer: ComposerSettings {
                default_calendar: default_calendar.to_string(),
                timezone,
                retry: RetryPolicy {
                    max_attempts: service.max_attempts,
                    initial_backoff: Duration::from_millis(service.initial_backoff_ms),
                    max_backoff: Duration::from_millis(service.max_backoff_ms),
                    timeout: Duration::from_secs(service.timeout_secs),
                },
                workers: service.workers,
                reminders: self.reminders.clone(),
            },
            policy,
            base_url,
            token_uri: service.token_uri.clone(),
            log_file: self.logging.file.clone(),
            warnings,
        })
    }
}

fn parse_json_var<T: serde::de::DeserializeOwned>(
    var: &str,
    json: &str,
) -> Result<BTreeMap<String, T>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::InvalidEnv {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = ProjectDirs::from("com", "gcal-manager", "gcal-manager")
        .ok_or(ConfigError::NoConfigDir)?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}
