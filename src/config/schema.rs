use crate::error::ConfigError;
use chrono::{FixedOffset, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `PROMPTWARDEN_CONFIG`
/// is unset.
pub const DEFAULT_CONFIG_FILE: &str = "promptwarden.toml";

// ── Top-level config ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was loaded from. Computed, never serialized.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// SQLite database holding the `Users` and `Messages` tables.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// File whose contents become the system prompt for every completion.
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,

    #[serde(default)]
    pub quota: QuotaPolicy,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub links: LinksConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("bot_prompt.txt")
}

// ── Quota policy ─────────────────────────────────────────────────

/// Usage-governance knobs: daily allowance, reset boundary and the two
/// abuse limiters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Prompts per user per day for tier >= 0.
    #[serde(default = "default_daily_allowance")]
    pub daily_allowance: u32,
    /// Offset of the reset time zone from UTC, in minutes (660 = UTC+11).
    #[serde(default = "default_reset_utc_offset_minutes")]
    pub reset_utc_offset_minutes: i32,
    /// Local wall-clock time at which every counter returns to zero.
    #[serde(default = "default_reset_time")]
    pub reset_time: NaiveTime,
    #[serde(default = "default_command_burst_limit")]
    pub command_burst_limit: usize,
    #[serde(default = "default_command_burst_window_secs")]
    pub command_burst_window_secs: u64,
    #[serde(default = "default_flood_message_limit")]
    pub flood_message_limit: usize,
    #[serde(default = "default_flood_window_secs")]
    pub flood_window_secs: u64,
    #[serde(default = "default_suspension_secs")]
    pub suspension_secs: u64,
    /// Rate windows untouched for this long are dropped.
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,
    /// How often the dispatcher sweeps idle rate windows.
    #[serde(default = "default_eviction_sweep_secs")]
    pub eviction_sweep_secs: u64,
}

fn default_daily_allowance() -> u32 {
    3
}

fn default_reset_utc_offset_minutes() -> i32 {
    11 * 60
}

fn default_reset_time() -> NaiveTime {
    NaiveTime::default()
}

fn default_command_burst_limit() -> usize {
    5
}

fn default_command_burst_window_secs() -> u64 {
    20
}

fn default_flood_message_limit() -> usize {
    5
}

fn default_flood_window_secs() -> u64 {
    10
}

fn default_suspension_secs() -> u64 {
    60
}

fn default_idle_eviction_secs() -> u64 {
    24 * 60 * 60
}

fn default_eviction_sweep_secs() -> u64 {
    60 * 60
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_allowance: default_daily_allowance(),
            reset_utc_offset_minutes: default_reset_utc_offset_minutes(),
            reset_time: default_reset_time(),
            command_burst_limit: default_command_burst_limit(),
            command_burst_window_secs: default_command_burst_window_secs(),
            flood_message_limit: default_flood_message_limit(),
            flood_window_secs: default_flood_window_secs(),
            suspension_secs: default_suspension_secs(),
            idle_eviction_secs: default_idle_eviction_secs(),
            eviction_sweep_secs: default_eviction_sweep_secs(),
        }
    }
}

fn secs_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

impl QuotaPolicy {
    pub fn reset_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.reset_utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::Validation(format!(
                "quota.reset_utc_offset_minutes out of range: {}",
                self.reset_utc_offset_minutes
            ))
        })
    }

    pub fn command_burst_window(&self) -> TimeDelta {
        secs_delta(self.command_burst_window_secs)
    }

    pub fn flood_window(&self) -> TimeDelta {
        secs_delta(self.flood_window_secs)
    }

    pub fn idle_eviction(&self) -> TimeDelta {
        secs_delta(self.idle_eviction_secs)
    }

    pub fn suspension(&self) -> Duration {
        Duration::from_secs(self.suspension_secs)
    }

    pub fn eviction_sweep(&self) -> Duration {
        Duration::from_secs(self.eviction_sweep_secs.max(1))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.reset_offset()?;
        if self.command_burst_limit == 0 {
            return Err(ConfigError::Validation(
                "quota.command_burst_limit must be at least 1".into(),
            ));
        }
        if self.flood_message_limit < 2 {
            return Err(ConfigError::Validation(
                "quota.flood_message_limit must be at least 2".into(),
            ));
        }
        if self.command_burst_window_secs == 0 || self.flood_window_secs == 0 {
            return Err(ConfigError::Validation(
                "quota rate windows must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ── Discord ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. Normally supplied through `DISCORD_TOKEN`.
    #[serde(default)]
    pub bot_token: String,
    /// Falls back to the application id announced in READY.
    #[serde(default)]
    pub application_id: Option<String>,
    /// Register slash commands in this guild only (instant propagation).
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub intents: Option<u64>,
}

// ── Completion service ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Normally supplied through `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f64,
    #[serde(default = "default_penalty")]
    pub presence_penalty: f64,
    /// Upper bound on one completion call, connect through body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_top_p() -> f64 {
    1.0
}

fn default_penalty() -> f64 {
    0.1
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: default_penalty(),
            presence_penalty: default_penalty(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily-rotated log file.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_prefix() -> String {
    "promptwarden.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            level: default_log_level(),
        }
    }
}

// ── Link buttons ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Button shown when a user has run out of prompts.
    #[serde(default = "default_upsell_label")]
    pub upsell_label: String,
    #[serde(default = "default_upsell_url")]
    pub upsell_url: String,
    /// Button attached to `/fact`.
    #[serde(default = "default_fact_label")]
    pub fact_label: String,
    #[serde(default = "default_fact_url")]
    pub fact_url: String,
}

fn default_upsell_label() -> String {
    "💳 Pay up buddy".to_string()
}

fn default_upsell_url() -> String {
    "https://www.patreon.com/".to_string()
}

fn default_fact_label() -> String {
    "💳 Chip in".to_string()
}

fn default_fact_url() -> String {
    "https://www.beemit.com.au/split-expenses".to_string()
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            upsell_label: default_upsell_label(),
            upsell_url: default_upsell_url(),
            fact_label: default_fact_label(),
            fact_url: default_fact_url(),
        }
    }
}

// ── Reliability / supervision ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Initial backoff for gateway listener restarts.
    #[serde(default = "default_listener_backoff_secs")]
    pub listener_initial_backoff_secs: u64,
    /// Max backoff for gateway listener restarts.
    #[serde(default = "default_listener_backoff_max_secs")]
    pub listener_max_backoff_secs: u64,
}

fn default_listener_backoff_secs() -> u64 {
    2
}

fn default_listener_backoff_max_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            listener_initial_backoff_secs: default_listener_backoff_secs(),
            listener_max_backoff_secs: default_listener_backoff_max_secs(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            database_path: default_database_path(),
            system_prompt_path: default_system_prompt_path(),
            quota: QuotaPolicy::default(),
            discord: DiscordConfig::default(),
            completion: CompletionConfig::default(),
            logging: LoggingConfig::default(),
            links: LinksConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load `path` if it exists, otherwise start from defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
            config.config_path = path.to_path_buf();
            config
        } else {
            Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config path from `PROMPTWARDEN_CONFIG`, then load it.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("PROMPTWARDEN_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        Self::load(&path)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("DISCORD_TOKEN")
            && !token.is_empty()
        {
            self.discord.bot_token = token;
        }

        if let Ok(app_id) = std::env::var("DISCORD_APPLICATION_ID")
            && !app_id.is_empty()
        {
            self.discord.application_id = Some(app_id);
        }

        if let Ok(guild_id) = std::env::var("DISCORD_GUILD_ID")
            && !guild_id.is_empty()
        {
            self.discord.guild_id = Some(guild_id);
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.completion.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("PROMPTWARDEN_MODEL")
            && !model.is_empty()
        {
            self.completion.model = model;
        }

        if let Ok(base_url) = std::env::var("PROMPTWARDEN_OPENAI_BASE_URL")
            && !base_url.is_empty()
        {
            self.completion.base_url = base_url;
        }

        if let Ok(db) = std::env::var("PROMPTWARDEN_DATABASE")
            && !db.is_empty()
        {
            self.database_path = PathBuf::from(db);
        }

        if let Ok(prompt) = std::env::var("PROMPTWARDEN_SYSTEM_PROMPT")
            && !prompt.is_empty()
        {
            self.system_prompt_path = PathBuf::from(prompt);
        }

        if let Ok(level) = std::env::var("PROMPTWARDEN_LOG_LEVEL")
            && !level.is_empty()
        {
            self.logging.level = level;
        }

        if let Ok(raw) = std::env::var("PROMPTWARDEN_DAILY_ALLOWANCE")
            && let Ok(allowance) = raw.parse::<u32>()
        {
            self.quota.daily_allowance = allowance;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.quota.validate()?;

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::Validation(format!(
                "completion.temperature must be within 0.0..=2.0, got {}",
                self.completion.temperature
            )));
        }
        if self.completion.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "completion.request_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Checks that only matter once the bot is about to connect.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "DISCORD_TOKEN is not set".into(),
            ));
        }
        if self
            .completion
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "OPENAI_API_KEY is not set".into(),
            ));
        }
        Ok(())
    }
}
