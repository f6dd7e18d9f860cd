use crate::ledger::UserId;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A slash command invoked by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    /// Platform interaction id, unique per invocation.
    pub id: u64,
    /// Credential for follow-up replies to this invocation.
    pub token: String,
    pub name: String,
    pub options: Vec<(String, String)>,
    pub user_id: UserId,
    pub user_name: String,
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub received_at: DateTime<Utc>,
    /// Inbound payload with credentials stripped, kept for the audit log.
    pub raw: serde_json::Value,
}

impl CommandEvent {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A plain chat message, observed only for flood detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Command(CommandEvent),
    Message(ChatMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

/// A button that opens a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// One outgoing message: text plus optional decoration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub embed: Option<Embed>,
    pub link: Option<LinkButton>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.link = Some(LinkButton {
            label: label.into(),
            url: url.into(),
        });
        self
    }
}

/// Chat platform contract: event intake plus the handful of calls the
/// governance core makes back into the platform.
pub trait Platform: Send + Sync {
    /// Human-readable platform name
    fn name(&self) -> &str;

    /// Largest message body the platform accepts, in characters.
    fn max_message_length(&self) -> usize;

    /// How a user is addressed inside message text.
    fn mention(&self, user: UserId) -> String;

    /// Start listening for incoming events (long-running)
    fn listen<'a>(
        &'a self,
        tx: tokio::sync::mpsc::Sender<PlatformEvent>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Acknowledge a command now and reply later.
    fn defer<'a>(
        &'a self,
        command: &'a CommandEvent,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Send one follow-up message for a deferred command.
    fn reply<'a>(
        &'a self,
        command: &'a CommandEvent,
        reply: &'a Reply,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Post a plain message to a channel.
    fn notify<'a>(
        &'a self,
        channel_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Revoke a member's ability to post for `duration`.
    fn suspend<'a>(
        &'a self,
        guild_id: &'a str,
        user: UserId,
        duration: Duration,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}
