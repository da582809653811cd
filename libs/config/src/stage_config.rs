//! Stage Configuration Module
//!
//! Provides configuration loading and validation for a Stage.
//! Supports loading from TOML files with environment-specific overrides.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::defaults;

/// Main stage configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StageConfig {
    /// Stage identity and directory sizing
    pub stage: StageSettings,

    /// Worker pool used to run mailboxes
    pub dispatcher: DispatcherConfig,

    /// Mailbox selection and bounded mailbox behavior
    pub mailbox: MailboxConfig,

    /// Default and per-protocol supervisors
    pub supervision: SupervisionConfig,

    /// Idle actor eviction
    pub eviction: EvictionConfig,

    /// Log output
    pub logging: LoggingConfig,
}

/// Stage identity and directory sizing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StageSettings {
    pub name: String,
    pub directory_buckets: usize,
    pub directory_capacity: usize,
    pub registration_attempts: usize,
}

/// Worker pool sizing and per-turn throttling
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Fixed worker count; when absent the pool is sized from the processor count
    pub threads: Option<usize>,
    pub pool_factor: f32,
    pub throttling: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MailboxConfig {
    /// Mailbox used when a definition does not name one
    pub default: String,
    pub bounded: BoundedMailboxConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BoundedMailboxConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub send_timeout_ms: u64,
}

/// What a bounded mailbox does with a message that does not fit
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Hand the message to dead letters immediately
    #[default]
    DeadLetter,
    /// Block the sender up to `send_timeout_ms`, then dead-letter
    Block,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Strategy of the supervisor used by actors without a mapped supervisor
    pub default: StrategyConfig,

    /// Supervisors shared by every actor of a protocol
    pub common: Vec<CommonSupervisorConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// `-1` restarts forever; `1` stops on the first failure
    pub intensity: i64,
    pub period_ms: u64,
    pub scope: ScopeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeConfig {
    #[default]
    One,
    All,
}

/// One protocol-to-supervisor mapping
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CommonSupervisorConfig {
    /// Protocol name as reported by `std::any::type_name`
    pub protocol: String,
    pub name: Option<String>,
    #[serde(default = "default_intensity")]
    pub intensity: i64,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub scope: ScopeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EvictionConfig {
    pub enabled: bool,
    pub lru_threshold_ms: u64,
    pub fill_ratio_high_watermark: f32,
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Full `EnvFilter` directive; overrides `level` when present
    pub filter: Option<String>,
    pub json: bool,
}

fn default_intensity() -> i64 {
    defaults::supervision::INTENSITY
}

fn default_period_ms() -> u64 {
    defaults::supervision::PERIOD_MS
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            name: defaults::stage::NAME.to_string(),
            directory_buckets: defaults::stage::DIRECTORY_BUCKETS,
            directory_capacity: defaults::stage::DIRECTORY_CAPACITY,
            registration_attempts: defaults::stage::REGISTRATION_ATTEMPTS,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            threads: None,
            pool_factor: defaults::dispatcher::POOL_FACTOR,
            throttling: defaults::dispatcher::THROTTLING,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            default: defaults::mailbox::QUEUE.to_string(),
            bounded: BoundedMailboxConfig::default(),
        }
    }
}

impl Default for BoundedMailboxConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::mailbox::BOUNDED_CAPACITY,
            overflow: OverflowPolicy::default(),
            send_timeout_ms: defaults::mailbox::SEND_TIMEOUT_MS,
        }
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            default: StrategyConfig::default(),
            common: Vec::new(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            intensity: defaults::supervision::INTENSITY,
            period_ms: defaults::supervision::PERIOD_MS,
            scope: ScopeConfig::One,
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lru_threshold_ms: defaults::eviction::LRU_THRESHOLD_MS,
            fill_ratio_high_watermark: defaults::eviction::FILL_RATIO_HIGH_WATERMARK,
            interval_ms: defaults::eviction::INTERVAL_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter: None,
            json: false,
        }
    }
}

impl CommonSupervisorConfig {
    /// Strategy portion of the mapping
    pub fn strategy(&self) -> StrategyConfig {
        StrategyConfig {
            intensity: self.intensity,
            period_ms: self.period_ms,
            scope: self.scope,
        }
    }
}

impl StrategyConfig {
    fn validate(&self, field: &str) -> Result<()> {
        if self.intensity == 0 || self.intensity < defaults::supervision::FOREVER_INTENSITY {
            bail!(
                "{}.intensity must be {} (forever) or a positive count, got {}",
                field,
                defaults::supervision::FOREVER_INTENSITY,
                self.intensity
            );
        }
        if self.intensity > i64::from(u32::MAX) {
            bail!("{}.intensity {} is out of range", field, self.intensity);
        }
        if self.period_ms == 0 {
            bail!("{}.period_ms must be greater than zero", field);
        }
        Ok(())
    }
}

impl StageConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let default_path = default_config_path();
        let base = base_path.unwrap_or(default_path.as_path());

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("config"))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (STAGE__ prefix)
        builder = builder.add_source(
            Environment::with_prefix("STAGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut stage_config: StageConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        stage_config.expand_env_vars()?;
        stage_config.validate()?;
        debug!(stage = %stage_config.stage.name, "Loaded stage configuration from {:?}", base);
        Ok(stage_config)
    }

    /// Parse configuration embedded in a string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        let stage_config: StageConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        stage_config.validate()?;
        Ok(stage_config)
    }

    /// Expand environment variables in string values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.stage.name).context("Failed to expand stage name")?;
        self.stage.name = expanded.to_string();

        if let Some(filter) = &self.logging.filter {
            let expanded = shellexpand::env(filter).context("Failed to expand logging filter")?;
            self.logging.filter = Some(expanded.to_string());
        }

        Ok(())
    }

    /// Reject settings the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.stage.name.trim().is_empty() {
            bail!("stage.name cannot be empty");
        }
        if self.stage.directory_buckets == 0 {
            bail!("stage.directory_buckets must be greater than zero");
        }
        if self.stage.directory_capacity == 0 {
            bail!("stage.directory_capacity must be greater than zero");
        }
        if self.stage.registration_attempts == 0 {
            bail!("stage.registration_attempts must be greater than zero");
        }

        if self.dispatcher.threads == Some(0) {
            bail!("dispatcher.threads must be greater than zero when set");
        }
        if !(self.dispatcher.pool_factor > 0.0) {
            bail!("dispatcher.pool_factor must be positive");
        }
        if self.dispatcher.throttling == 0 {
            bail!("dispatcher.throttling must be greater than zero");
        }

        match self.mailbox.default.as_str() {
            defaults::mailbox::QUEUE | defaults::mailbox::BOUNDED => {}
            other => bail!(
                "mailbox.default must be '{}' or '{}', got '{}'",
                defaults::mailbox::QUEUE,
                defaults::mailbox::BOUNDED,
                other
            ),
        }
        if self.mailbox.bounded.capacity == 0 {
            bail!("mailbox.bounded.capacity must be greater than zero");
        }

        self.supervision.default.validate("supervision.default")?;

        let mut seen = HashSet::new();
        for (index, common) in self.supervision.common.iter().enumerate() {
            let field = format!("supervision.common[{}]", index);
            if common.protocol.trim().is_empty() {
                bail!("{}.protocol cannot be empty", field);
            }
            if !seen.insert(common.protocol.as_str()) {
                bail!("{}.protocol '{}' is mapped more than once", field, common.protocol);
            }
            common.strategy().validate(&field)?;
        }

        let ratio = self.eviction.fill_ratio_high_watermark;
        if !(ratio > 0.0 && ratio <= 1.0) {
            bail!("eviction.fill_ratio_high_watermark must be in (0, 1], got {}", ratio);
        }
        if self.eviction.enabled && self.eviction.interval_ms == 0 {
            bail!("eviction.interval_ms must be greater than zero when eviction is enabled");
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Find the supervisor mapping for a protocol name
    pub fn common_supervisor(&self, protocol: &str) -> Option<&CommonSupervisorConfig> {
        self.supervision.common.iter().find(|c| c.protocol == protocol)
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(environment: Option<&str>) -> Result<StageConfig> {
    StageConfig::load(None, environment)
}

/// Default location of the configuration file relative to the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config/stage.toml")
}
