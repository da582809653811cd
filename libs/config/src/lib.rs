//! # Stage Configuration
//!
//! Configuration model, defaults and loader for the Stage actor runtime.
//!
//! ## Usage
//!
//! ```rust
//! use stage_config::{defaults, StageConfig};
//!
//! let config = StageConfig::from_toml_str("[dispatcher]\nthrottling = 10\n").unwrap();
//! assert_eq!(config.dispatcher.throttling, 10);
//! assert_eq!(config.mailbox.default, defaults::mailbox::QUEUE);
//! ```

pub mod defaults;
pub mod stage_config;

// Re-export commonly used types
pub use stage_config::{
    default_config_path, load_config, BoundedMailboxConfig, CommonSupervisorConfig,
    DispatcherConfig, EvictionConfig, LoggingConfig, MailboxConfig, OverflowPolicy, ScopeConfig,
    StageConfig, StageSettings, StrategyConfig, SupervisionConfig,
};
