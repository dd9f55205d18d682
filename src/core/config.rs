use crate::models::transfer::RatioSource;
use crate::policy::classifier::Policy;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SWARM_GUARD_CONFIG";
/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "swarm-guard.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transfer_manager: TransferManagerConfig,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferManagerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// Remove completed over-limit transfers from the client, keeping files
    #[serde(default = "default_true")]
    pub remove_completed: bool,
    #[serde(default = "default_max_warning_lines")]
    pub max_warning_lines: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// When false the queue pass only logs the ranking
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_radarr", deserialize_with = "radarr_service")]
    pub radarr: ArrServiceConfig,
    #[serde(default = "default_sonarr", deserialize_with = "sonarr_service")]
    pub sonarr: ArrServiceConfig,
}

/// One upstream job-queue service
#[derive(Debug, Clone)]
pub struct ArrServiceConfig {
    pub url: String,
    /// XML file holding `<ApiKey>`; a leading `~/` expands to $HOME
    pub config_path: PathBuf,
    /// Transfer category routed to this service
    pub category: String,
}

/// A `[research.radarr]` / `[research.sonarr]` table. Fields left out keep
/// that service's default.
#[derive(Debug, Deserialize)]
struct ArrServiceTable {
    url: Option<String>,
    config_path: Option<PathBuf>,
    category: Option<String>,
}

impl ArrServiceTable {
    fn over(self, defaults: ArrServiceConfig) -> ArrServiceConfig {
        ArrServiceConfig {
            url: self.url.unwrap_or(defaults.url),
            config_path: self.config_path.unwrap_or(defaults.config_path),
            category: self.category.unwrap_or(defaults.category),
        }
    }
}

fn radarr_service<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ArrServiceConfig, D::Error> {
    ArrServiceTable::deserialize(deserializer).map(|table| table.over(default_radarr()))
}

fn sonarr_service<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ArrServiceConfig, D::Error> {
    ArrServiceTable::deserialize(deserializer).map(|table| table.over(default_sonarr()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Append log lines here too, if the file can be opened
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Upper bound on concurrent classification workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_url() -> String {
    "http://10.200.200.2:8080".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "adminadmin".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_warning_lines() -> usize {
    10
}

fn default_page_size() -> u32 {
    1000
}

fn default_radarr() -> ArrServiceConfig {
    ArrServiceConfig {
        url: "http://localhost:7878".to_string(),
        config_path: PathBuf::from("~/.config/Radarr/config.xml"),
        category: "radarr".to_string(),
    }
}

fn default_sonarr() -> ArrServiceConfig {
    ArrServiceConfig {
        url: "http://localhost:8989".to_string(),
        config_path: PathBuf::from("~/.config/Sonarr/config.xml"),
        category: "sonarr".to_string(),
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_concurrency() -> usize {
    8
}

impl Default for TransferManagerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: default_password(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            remove_completed: true,
            max_warning_lines: default_max_warning_lines(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            radarr: default_radarr(),
            sonarr: default_sonarr(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            path: None,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    /// Defaults, then the config file if any, then environment overrides
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(lookup)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file. Validation happens after env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QB_URL") {
            self.transfer_manager.url = url;
        }
        if let Some(user) = lookup("QB_USER") {
            self.transfer_manager.username = user;
        }
        if let Some(pass) = lookup("QB_PASS") {
            self.transfer_manager.password = pass;
        }

        override_parsed(&lookup, "SWARM_GUARD_MAX_RATIO", &mut self.policy.max_ratio_complete)?;
        override_parsed(
            &lookup,
            "SWARM_GUARD_MAX_RATIO_INCOMPLETE",
            &mut self.policy.max_ratio_incomplete,
        )?;
        override_parsed(&lookup, "SWARM_GUARD_DEAD_SWARM_RATIO", &mut self.policy.dead_swarm_ratio)?;
        override_parsed(
            &lookup,
            "SWARM_GUARD_DEAD_SWARM_MIN_AVAILABILITY",
            &mut self.policy.dead_swarm_min_availability,
        )?;
        override_parsed(&lookup, "SWARM_GUARD_NOTIFY_RATIO", &mut self.policy.notify_ratio)?;

        if let Some(source) = lookup("SWARM_GUARD_RATIO_SOURCE") {
            self.policy.ratio_source = RatioSource::from_str(&source)
                .map_err(|e| anyhow::anyhow!("SWARM_GUARD_RATIO_SOURCE: {}", e))?;
        }

        override_parsed(&lookup, "SWARM_GUARD_REMOVE_COMPLETED", &mut self.guard.remove_completed)?;
        override_parsed(&lookup, "SWARM_GUARD_RESEARCH", &mut self.research.enabled)?;
        override_parsed(&lookup, "SWARM_GUARD_CONCURRENCY", &mut self.runtime.concurrency)?;

        if let Some(level) = lookup("SWARM_GUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SWARM_GUARD_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(path) = lookup("SWARM_GUARD_LOG_FILE") {
            self.logging.path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate transfer manager config
        if self.transfer_manager.url.is_empty() {
            bail!("transfer_manager.url must not be empty");
        }

        if self.transfer_manager.username.is_empty() {
            bail!("transfer_manager.username must not be empty");
        }

        if self.transfer_manager.timeout_secs == 0 {
            bail!("transfer_manager.timeout_secs must be greater than 0");
        }

        // Validate policy thresholds
        let thresholds = [
            ("max_ratio_complete", self.policy.max_ratio_complete),
            ("max_ratio_incomplete", self.policy.max_ratio_incomplete),
            ("dead_swarm_ratio", self.policy.dead_swarm_ratio),
            ("dead_swarm_min_availability", self.policy.dead_swarm_min_availability),
            ("notify_ratio", self.policy.notify_ratio),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                bail!("policy.{} must be a finite non-negative number, got {}", name, value);
            }
        }

        // Validate research config
        if self.research.page_size == 0 {
            bail!("research.page_size must be greater than 0");
        }

        // Validate runtime config
        if self.runtime.worker_threads == 0 {
            bail!("runtime.worker_threads must be greater than 0");
        }

        if self.runtime.concurrency == 0 || self.runtime.concurrency > 64 {
            bail!(
                "runtime.concurrency must be between 1 and 64, got {}",
                self.runtime.concurrency
            );
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e))?;
    }
    Ok(())
}

/// Expand a leading `~/` against $HOME
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
