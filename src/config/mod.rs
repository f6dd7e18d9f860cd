pub mod schema;

pub use schema::{
    CompletionConfig, Config, DEFAULT_CONFIG_FILE, DiscordConfig, LinksConfig, LoggingConfig,
    QuotaPolicy, ReliabilityConfig,
};
