//! Chat platform seam: the event and reply types the governance core works
//! with, the `Platform` trait, and the Discord adapter.

pub mod discord;
pub mod supervisor;
pub mod traits;

pub use discord::DiscordPlatform;
pub use supervisor::{backoff_settings, spawn_supervised_listener};
pub use traits::{
    ChatMessage, CommandEvent, Embed, EmbedField, LinkButton, Platform, PlatformEvent, Reply,
};
