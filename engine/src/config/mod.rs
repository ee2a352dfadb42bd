//! Configuration management
//!
//! This module handles loading, validation, and management of the Tapwise configuration.
//! Configuration is stored in TOML format at ~/.tapwise/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Model providers, timeout and retry policy, generation parameters
//! - **agent**: Step budget and consecutive-error ceiling for the control loop
//! - **skills**: Skill catalog location and matcher thresholds
//! - **device**: ADB backend settings
//!
//! # Examples
//!
//! ```no_run
//! use tapwise_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Step budget: {}", config.agent.max_steps);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Providers the gateway knows how to build
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "ollama"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Model gateway configuration
    pub llm: LLMConfig,

    /// Control loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Skill catalog and matcher settings
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Device backend settings
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider tried first (openai, ollama)
    pub default_provider: String,

    /// Providers tried, in order, after the default one exhausts its retries
    #[serde(default)]
    pub fallback_providers: Vec<String>,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt on transport failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff between retries, doubled on every attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sampling temperature. 0.0 keeps generation deterministic; anything
    /// else is an explicit override, accepted in [0.0, 2.0]
    #[serde(default)]
    pub temperature: f32,

    /// Completion length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl LLMConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Default provider followed by fallbacks, without duplicates
    pub fn provider_order(&self) -> Vec<String> {
        let mut order = vec![self.default_provider.clone()];
        for name in &self.fallback_providers {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
        order
    }
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the chat-completions API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Whether the endpoint accepts frequency/presence penalties
    #[serde(default = "default_true")]
    pub supports_penalties: bool,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name (must be vision-capable)
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard ceiling on successful steps per task
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Consecutive step failures tolerated before the run fails
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: usize,

    /// Directory for screenshots captured during a run (supports ~ expansion)
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_consecutive_errors: default_max_consecutive_errors(),
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

/// Skill catalog and matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Path to the skill catalog TOML file (supports ~ expansion)
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Minimum keyword score for a match to be kept
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: f64,

    /// Minimum model confidence before falling back to keywords
    #[serde(default = "default_model_confidence_threshold")]
    pub model_confidence_threshold: f64,

    /// Minimum confidence for a delegation fast path
    #[serde(default = "default_fast_path_confidence")]
    pub fast_path_confidence: f64,

    /// Ask the model gateway to classify intent before keyword scoring
    #[serde(default = "default_true")]
    pub use_model_classifier: bool,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            keyword_threshold: default_keyword_threshold(),
            model_confidence_threshold: default_model_confidence_threshold(),
            fast_path_confidence: default_fast_path_confidence(),
            use_model_classifier: true,
        }
    }
}

/// ADB device backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the adb binary
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Device serial; the only connected device is used when unset
    #[serde(default)]
    pub serial: Option<String>,

    /// Per-action timeout in seconds
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,

    /// Pause after each action before capturing the screen, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            serial: None,
            action_timeout_secs: default_action_timeout(),
            settle_ms: default_settle_ms(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llava:13b".to_string()
}

fn default_max_steps() -> usize {
    30
}

fn default_max_consecutive_errors() -> usize {
    3
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("~/.tapwise/screens")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("~/.tapwise/skills.toml")
}

fn default_keyword_threshold() -> f64 {
    0.3
}

fn default_model_confidence_threshold() -> f64 {
    0.5
}

fn default_fast_path_confidence() -> f64 {
    0.8
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_action_timeout() -> u64 {
    15
}

fn default_settle_ms() -> u64 {
    800
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
            supports_penalties: true,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            fallback_providers: Vec::new(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.tapwise/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (thresholds out of range, zero ceilings)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let default = Self::default_config();

        // Written before path expansion so the file stays portable
        let toml_string = toml::to_string_pretty(&default)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = default;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.tapwise/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".tapwise").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
            },
            llm: LLMConfig::default(),
            agent: AgentConfig::default(),
            skills: SkillsConfig::default(),
            device: DeviceConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and provider names
    /// - Checks thresholds lie in [0, 1] and ceilings are non-zero
    /// - Expands ~ in paths
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for provider in self.llm.provider_order() {
            if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
                return Err(EngineError::Config(format!(
                    "Invalid provider '{}'. Must be one of: {}",
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(EngineError::Config(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(EngineError::Config(
                "agent.max_steps must be greater than 0".to_string(),
            ));
        }
        if self.agent.max_consecutive_errors == 0 {
            return Err(EngineError::Config(
                "agent.max_consecutive_errors must be greater than 0".to_string(),
            ));
        }

        let thresholds = [
            ("skills.keyword_threshold", self.skills.keyword_threshold),
            (
                "skills.model_confidence_threshold",
                self.skills.model_confidence_threshold,
            ),
            (
                "skills.fast_path_confidence",
                self.skills.fast_path_confidence,
            ),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        self.agent.screenshot_dir = expand_path(&self.agent.screenshot_dir)?;
        self.skills.catalog_path = expand_path(&self.skills.catalog_path)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
