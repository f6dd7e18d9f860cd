pub mod commands;
pub mod gateway;
pub mod http_client;
pub mod types;

use crate::config::DiscordConfig;
use crate::error::TransportError;
use crate::ledger::UserId;
use crate::platform::{ChatMessage, CommandEvent, Platform, PlatformEvent, Reply};
use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use self::commands::{build_default_commands, parse_command, reply_payload};
use self::gateway::{DiscordGateway, DiscordGatewayState, GatewayEvent};
use self::http_client::DiscordHttpClient;
use self::types::{DEFAULT_INTENTS, MAX_MESSAGE_LENGTH, snowflake_timestamp};

pub struct DiscordPlatform {
    http: DiscordHttpClient,
    gateway_state: Arc<DiscordGatewayState>,
    config: DiscordConfig,
    application_id: std::sync::Mutex<Option<String>>,
}

impl DiscordPlatform {
    pub fn new(config: DiscordConfig) -> Self {
        Self::with_http(DiscordHttpClient::new(&config.bot_token), config)
    }

    pub fn with_http(http: DiscordHttpClient, config: DiscordConfig) -> Self {
        let application_id = std::sync::Mutex::new(config.application_id.clone());
        Self {
            http,
            gateway_state: Arc::new(DiscordGatewayState::default()),
            config,
            application_id,
        }
    }

    fn intents(&self) -> u64 {
        self.config.intents.unwrap_or(DEFAULT_INTENTS)
    }

    fn set_application_id(&self, id: &str) {
        if let Ok(mut guard) = self.application_id.lock()
            && guard.is_none()
        {
            *guard = Some(id.to_string());
        }
    }

    fn application_id(&self) -> Option<String> {
        self.application_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    async fn handle_gateway_event(
        &self,
        event: GatewayEvent,
        tx: &tokio::sync::mpsc::Sender<PlatformEvent>,
    ) {
        let platform_event = match event {
            GatewayEvent::Ready {
                user_id,
                application_id,
                ..
            } => {
                self.handle_ready(&user_id, application_id.as_deref()).await;
                return;
            }
            GatewayEvent::MessageCreate {
                message_id,
                channel_id,
                author_id,
                author_is_bot,
                guild_id,
                timestamp,
            } => {
                let Some(message) = build_chat_message(
                    message_id,
                    channel_id,
                    &author_id,
                    author_is_bot,
                    guild_id,
                    timestamp.as_deref(),
                ) else {
                    tracing::debug!(author_id = %author_id, "Discord: unparseable message author");
                    return;
                };
                PlatformEvent::Message(message)
            }
            GatewayEvent::InteractionCreate { payload } => {
                let Some(command) = parse_command(&payload, Utc::now()) else {
                    tracing::trace!("Discord: ignoring non-command interaction");
                    return;
                };
                PlatformEvent::Command(command)
            }
        };

        if tx.send(platform_event).await.is_err() {
            tracing::warn!("Discord: platform event receiver dropped");
        }
    }

    async fn handle_ready(&self, user_id: &str, application_id: Option<&str>) {
        tracing::info!(user_id, "Discord: connected");
        if let Some(id) = application_id {
            self.set_application_id(id);
        }

        let Some(app_id) = self.application_id() else {
            tracing::warn!("Discord: application id unknown; slash commands not registered");
            return;
        };

        let cmds = build_default_commands();
        match self
            .http
            .register_commands(&app_id, self.config.guild_id.as_deref(), &cmds)
            .await
        {
            Ok(()) => tracing::info!(count = cmds.len(), "Discord: slash commands registered"),
            Err(e) => tracing::warn!("Discord: failed to register slash commands: {e:#}"),
        }
    }

    async fn run_gateway(&self, tx: tokio::sync::mpsc::Sender<PlatformEvent>) -> anyhow::Result<()> {
        let gateway = DiscordGateway::new(
            self.config.bot_token.clone(),
            self.intents(),
            Arc::clone(&self.gateway_state),
        );

        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<GatewayEvent>(100);

        let mut gateway_handle = {
            let http = self.http.clone();
            tokio::spawn(async move { gateway.connect_and_listen(&http, &event_tx).await })
        };

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.handle_gateway_event(event, &tx).await;
                }
                result = &mut gateway_handle => {
                    // Forward anything parsed before the socket closed.
                    while let Ok(event) = event_rx.try_recv() {
                        self.handle_gateway_event(event, &tx).await;
                    }
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(e),
                        Err(e) => {
                            return Err(TransportError::Connection {
                                platform: "discord".into(),
                                message: format!("gateway task panicked: {e}"),
                            }
                            .into());
                        }
                    }
                    break;
                }
            }
        }

        Ok(())
    }
}

fn build_chat_message(
    message_id: String,
    channel_id: String,
    author_id: &str,
    author_is_bot: bool,
    guild_id: Option<String>,
    timestamp: Option<&str>,
) -> Option<ChatMessage> {
    let author = UserId(author_id.parse().ok()?);
    let sent_at = timestamp
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|| message_id.parse().ok().and_then(snowflake_timestamp))
        .unwrap_or_else(Utc::now);

    Some(ChatMessage {
        id: message_id,
        author_id: author,
        author_is_bot,
        channel_id,
        guild_id,
        sent_at,
    })
}

impl Platform for DiscordPlatform {
    fn name(&self) -> &str {
        "discord"
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    fn mention(&self, user: UserId) -> String {
        format!("<@{user}>")
    }

    /// Runs a single gateway session; the supervisor reconnects.
    fn listen<'a>(
        &'a self,
        tx: tokio::sync::mpsc::Sender<PlatformEvent>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.run_gateway(tx))
    }

    fn defer<'a>(
        &'a self,
        command: &'a CommandEvent,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.http
                .defer_interaction(&command.id.to_string(), &command.token)
                .await
        })
    }

    fn reply<'a>(
        &'a self,
        command: &'a CommandEvent,
        reply: &'a Reply,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let app_id = self.application_id().ok_or_else(|| TransportError::Connection {
                platform: "discord".into(),
                message: "application id not known yet".into(),
            })?;
            self.http
                .create_followup_message(&app_id, &command.token, reply_payload(reply))
                .await
        })
    }

    fn notify<'a>(
        &'a self,
        channel_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.http.send_message(channel_id, text))
    }

    fn suspend<'a>(
        &'a self,
        guild_id: &'a str,
        user: UserId,
        duration: Duration,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let length = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
            let until = Utc::now()
                .checked_add_signed(length)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.http
                .timeout_member(guild_id, &user.to_string(), until, reason)
                .await
        })
    }
}
