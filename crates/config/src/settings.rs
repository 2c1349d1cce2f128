//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{pool, reconcile, slots, turn};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub telephony: TelephonyConfig,

    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub dialer: DialerConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// HTTP/websocket server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base for webhook and stream URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// Redis coordination store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_pre_dial_ttl")]
    pub pre_dial_ttl_secs: u64,
    #[serde(default = "default_promote_mutex_ttl")]
    pub promote_mutex_ttl_secs: u64,
}

fn default_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn default_pre_dial_ttl() -> u64 {
    slots::PRE_DIAL_TTL_SECS
}

fn default_promote_mutex_ttl() -> u64 {
    slots::PROMOTE_MUTEX_TTL_SECS
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            pre_dial_ttl_secs: default_pre_dial_ttl(),
            promote_mutex_ttl_secs: default_promote_mutex_ttl(),
        }
    }
}

/// ScyllaDB persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "outdial".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Telephony gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Process secret the per-phone credential key is derived from
    #[serde(default = "default_credential_secret")]
    pub credential_secret: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_credential_secret() -> String {
    std::env::var("OUTDIAL_CREDENTIAL_SECRET").unwrap_or_default()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            credential_secret: default_credential_secret(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Streaming STT providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_deepgram_url")]
    pub deepgram_url: String,
    #[serde(default)]
    pub deepgram_api_key: String,
    #[serde(default = "default_sarvam_url")]
    pub sarvam_url: String,
    #[serde(default)]
    pub sarvam_api_key: String,
    /// Batch fallback endpoint (Whisper-style transcription API)
    #[serde(default)]
    pub batch_url: String,
    #[serde(default)]
    pub batch_api_key: String,
    #[serde(default = "default_pool_max")]
    pub pool_max_connections: usize,
    #[serde(default = "default_pool_queue")]
    pub pool_max_queued: usize,
    #[serde(default = "default_pool_timeout")]
    pub pool_acquire_timeout_secs: u64,
}

fn default_deepgram_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}

fn default_sarvam_url() -> String {
    "wss://api.sarvam.ai/speech-to-text/ws".to_string()
}

fn default_pool_max() -> usize {
    pool::MAX_CONNECTIONS
}

fn default_pool_queue() -> usize {
    pool::MAX_QUEUED
}

fn default_pool_timeout() -> u64 {
    pool::ACQUIRE_TIMEOUT_SECS
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            deepgram_url: default_deepgram_url(),
            deepgram_api_key: String::new(),
            sarvam_url: default_sarvam_url(),
            sarvam_api_key: String::new(),
            batch_url: String::new(),
            batch_api_key: String::new(),
            pool_max_connections: default_pool_max(),
            pool_max_queued: default_pool_queue(),
            pool_acquire_timeout_secs: default_pool_timeout(),
        }
    }
}

/// TTS providers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TtsConfig {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub elevenlabs_api_key: String,
    #[serde(default)]
    pub deepgram_api_key: String,
    #[serde(default)]
    pub sarvam_api_key: String,
}

/// LLM backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Knowledge retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection() -> String {
    "knowledge".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

/// Dialer and reconciler cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    #[serde(default = "default_waitlist_scan_interval")]
    pub waitlist_scan_interval_secs: u64,
    #[serde(default = "default_waitlist_scan_batch")]
    pub waitlist_scan_batch: usize,
    #[serde(default = "default_max_call_age")]
    pub max_call_age_secs: u64,
    #[serde(default = "default_purge_grace")]
    pub purge_grace_secs: u64,
}

fn default_waitlist_scan_interval() -> u64 {
    reconcile::WAITLIST_SCAN_INTERVAL_SECS
}

fn default_waitlist_scan_batch() -> usize {
    reconcile::WAITLIST_SCAN_BATCH
}

fn default_max_call_age() -> u64 {
    reconcile::MAX_CALL_AGE_SECS
}

fn default_purge_grace() -> u64 {
    reconcile::PURGE_GRACE_SECS
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            waitlist_scan_interval_secs: default_waitlist_scan_interval(),
            waitlist_scan_batch: default_waitlist_scan_batch(),
            max_call_age_secs: default_max_call_age(),
            purge_grace_secs: default_purge_grace(),
        }
    }
}

/// Voice-session timing overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub end_of_speech_debounce_ms: u64,
    #[serde(default = "default_max_utterance_ms")]
    pub max_utterance_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    turn::COOLDOWN_MS
}

fn default_debounce_ms() -> u64 {
    turn::END_OF_SPEECH_DEBOUNCE_MS
}

fn default_max_utterance_ms() -> u64 {
    turn::MAX_UTTERANCE_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            end_of_speech_debounce_ms: default_debounce_ms(),
            max_utterance_ms: default_max_utterance_ms(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.stt.pool_max_connections == 0 || self.stt.pool_max_connections > 20 {
            return Err(ConfigError::InvalidValue {
                field: "stt.pool_max_connections".to_string(),
                message: "pool size must be in [1, 20] (provider ceiling)".to_string(),
            });
        }
        if self.coordination.pre_dial_ttl_secs < 10 {
            return Err(ConfigError::InvalidValue {
                field: "coordination.pre_dial_ttl_secs".to_string(),
                message: "pre-dial TTL below 10s cannot outlive a slow gateway dial".to_string(),
            });
        }
        if self.dialer.purge_grace_secs > 60 {
            return Err(ConfigError::InvalidValue {
                field: "dialer.purge_grace_secs".to_string(),
                message: "purge grace above 60s stalls campaign teardown".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    if Path::new("config/default.toml").exists() {
        builder = builder.add_source(File::with_name("config/default"));
    }

    if let Some(env_name) = env {
        let env_file = format!("config/{}", env_name);
        if Path::new(&format!("{}.toml", env_file)).exists() {
            builder = builder.add_source(File::with_name(&env_file));
        }
    }

    builder = builder.add_source(Environment::with_prefix("OUTDIAL").separator("__"));

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    tracing::info!(
        port = settings.server.port,
        redis = %settings.coordination.redis_url,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_pool_ceiling_enforced() {
        let mut settings = Settings::default();
        settings.stt.pool_max_connections = 21;
        assert!(settings.validate().is_err());

        settings.stt.pool_max_connections = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_section_parsing() {
        let toml_src = r#"
            [server]
            port = 9000

            [dialer]
            max_call_age_secs = 3600
        "#;
        let settings: Settings = toml::from_str(toml_src).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.dialer.max_call_age_secs, 3600);
        // Untouched sections keep defaults
        assert_eq!(settings.session.cooldown_ms, 1500);
    }
}
