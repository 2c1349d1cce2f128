//! Configuration for the campaign dialer
//!
//! Settings are layered: built-in defaults, then `config/default.toml`,
//! then `config/{env}.toml`, then `OUTDIAL__`-prefixed environment
//! variables (double underscore as the section separator).

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, CoordinationConfig, DialerConfig, LlmConfig, PersistenceConfig, RagConfig,
    ServerConfig, SessionConfig, Settings, SttConfig, TelephonyConfig, TtsConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required value: {0}")]
    Missing(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}
