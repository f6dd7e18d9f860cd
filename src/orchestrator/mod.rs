//! Per-command orchestration: quota check, completion, audit, delivery.
//!
//! The command-burst check happens upstream in [`dispatch::Dispatcher`];
//! everything here runs after a command has been admitted.

pub mod dispatch;

pub use dispatch::Dispatcher;

use crate::completion::CompletionService;
use crate::config::{LinksConfig, QuotaPolicy};
use crate::delivery;
use crate::error::{LedgerError, Result, WardenError};
use crate::governance::{RefreshIn, ResetSchedule, is_eligible, prompts_left};
use crate::ledger::{InteractionRecord, Ledger, UserRecord};
use crate::platform::{CommandEvent, Embed, EmbedField, Platform, Reply};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const GENERIC_APOLOGY: &str = "Something went wrong, try again later.";
pub const UNKNOWN_COMMAND_REPLY: &str =
    "Sorry, I don't recognize that command. Try /help to see all available commands.";
pub const PROMPT_HEADING: &str = "**Your prompt:**";

const HELP_TITLE: &str = "🤖 Bot Commands Guide 🤖";
const HELP_COLOR: u32 = 0x34_98db;
const EMBED_FOOTER_LIMIT: usize = 2048;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    completion: Arc<dyn CompletionService>,
    platform: Arc<dyn Platform>,
    allowance: u32,
    schedule: ResetSchedule,
    links: LinksConfig,
    system_prompt: String,
    clock: Clock,
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    text.char_indices()
        .nth(limit)
        .map_or(text, |(cut, _)| &text[..cut])
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        completion: Arc<dyn CompletionService>,
        platform: Arc<dyn Platform>,
        policy: &QuotaPolicy,
        schedule: ResetSchedule,
        links: LinksConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            completion,
            platform,
            allowance: policy.daily_allowance,
            schedule,
            links,
            system_prompt: system_prompt.into(),
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock used for refresh countdowns.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Handle one admitted command. Expected failures (ledger, completion)
    /// are answered with an apology and return `Ok`; a failed delivery is
    /// returned so the caller can log it.
    pub async fn handle(&self, command: &CommandEvent) -> Result<()> {
        match self.route(command).await {
            Err(WardenError::Ledger(e)) => {
                tracing::error!(
                    command = %command.name,
                    user_id = %command.user_id,
                    error = %e,
                    "ledger operation failed"
                );
                self.say(command, Reply::text(GENERIC_APOLOGY)).await
            }
            Err(WardenError::Completion(e)) => {
                tracing::error!(
                    command = %command.name,
                    user_id = %command.user_id,
                    model = self.completion.model(),
                    error = %e,
                    "completion request failed"
                );
                self.say(command, Reply::text(GENERIC_APOLOGY)).await
            }
            other => other,
        }
    }

    async fn route(&self, command: &CommandEvent) -> Result<()> {
        match command.name.as_str() {
            "help" => self.help(command).await,
            "hello" => {
                self.say(command, Reply::text("Hello!")).await?;
                tracing::info!(user_id = %command.user_id, "hello command executed");
                Ok(())
            }
            "fact" => {
                let reply = Reply::text("Fact APIs are too expensive!")
                    .with_link(&self.links.fact_label, &self.links.fact_url);
                self.say(command, reply).await?;
                tracing::info!(user_id = %command.user_id, "fact command executed");
                Ok(())
            }
            "promptsleft" => self.prompts_left(command).await,
            "prompt" => self.prompt(command).await,
            other => {
                tracing::warn!(
                    command = other,
                    user_id = %command.user_id,
                    "unrecognized command"
                );
                self.say(command, Reply::text(UNKNOWN_COMMAND_REPLY)).await
            }
        }
    }

    async fn say(&self, command: &CommandEvent, reply: Reply) -> Result<()> {
        delivery::deliver(self.platform.as_ref(), command, reply).await?;
        Ok(())
    }

    /// Look the caller up, creating them on first contact and keeping the
    /// stored display name current.
    async fn resolve_user(
        &self,
        command: &CommandEvent,
    ) -> std::result::Result<UserRecord, LedgerError> {
        let Some(mut user) = self.ledger.get_user(command.user_id).await? else {
            return self
                .ledger
                .insert_user(command.user_id, &command.user_name)
                .await;
        };

        if !command.user_name.is_empty() && user.name != command.user_name {
            self.ledger
                .rename_user(user.id, &command.user_name)
                .await?;
            user.name.clone_from(&command.user_name);
        }
        Ok(user)
    }

    fn refresh_in(&self) -> RefreshIn {
        RefreshIn::from(self.schedule.time_until_next((self.clock)()))
    }

    async fn help(&self, command: &CommandEvent) -> Result<()> {
        let guide = format!(
            "- /hello - Greets the user.\n\
             - /fact - Gives a random cool fact!\n\
             - /promptsleft - Shows how many prompts you have left for the day.\n\
             - /prompt *[prompt]* - Sends your prompt to the AI for a response. \
             Usage is limited to {} per day.\n\n\
             *Remember, prompt usage is limited each day. Use your prompts wisely!*\n\n\
             *If you need more help or have suggestions, feel free to reach out to the admins.*",
            self.allowance
        );
        let embed = Embed {
            title: Some(HELP_TITLE.into()),
            color: Some(HELP_COLOR),
            fields: vec![EmbedField {
                name: "General Commands:".into(),
                value: guide,
                inline: false,
            }],
            ..Embed::default()
        };

        self.say(command, Reply::default().with_embed(embed)).await?;
        tracing::info!(user_id = %command.user_id, "help command executed");
        Ok(())
    }

    async fn prompts_left(&self, command: &CommandEvent) -> Result<()> {
        let user = self.resolve_user(command).await?;

        let left = prompts_left(user.uses, self.allowance);
        let text = if left < 1 {
            let refresh = self.refresh_in();
            format!(
                "You have prompted {} time(s) today. You do not have any prompts left. \
                 Prompts refresh in {} hrs and {} mins",
                user.uses, refresh.hours, refresh.minutes
            )
        } else {
            format!(
                "You have prompted {} time(s) today. You have {left} prompt(s) left",
                user.uses
            )
        };

        self.say(command, Reply::text(text)).await?;
        tracing::info!(user_id = %user.id, left, "promptsleft command executed");
        Ok(())
    }

    async fn prompt(&self, command: &CommandEvent) -> Result<()> {
        let Some(prompt) = command
            .option("prompt")
            .map(str::trim)
            .filter(|p| !p.is_empty())
        else {
            return self
                .say(command, Reply::text("Usage: /prompt [prompt]"))
                .await;
        };

        let user = self.resolve_user(command).await?;

        if !is_eligible(user.tier, user.uses, self.allowance) {
            let refresh = self.refresh_in();
            tracing::info!(
                user_id = %user.id,
                uses = user.uses,
                prompt,
                "prompt refused: daily allowance used"
            );
            let reply = Reply::text(format!("Prompts refresh in {refresh}"))
                .with_link(&self.links.upsell_label, &self.links.upsell_url);
            return self.say(command, reply).await;
        }

        self.ledger.increment_use(user.id).await?;

        let completion = match self.completion.complete(&self.system_prompt, prompt).await {
            Ok(completion) => completion,
            Err(e) => {
                if let Err(refund_err) = self.ledger.refund_use(user.id).await {
                    tracing::error!(user_id = %user.id, error = %refund_err, "use refund failed");
                }
                return Err(e.into());
            }
        };

        let entry = InteractionRecord {
            id: command.id,
            user_id: user.id,
            raw: command.raw.to_string(),
            prompt: prompt.to_string(),
            response: completion.text.clone(),
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            created_at: command.received_at,
        };
        if let Err(e) = self.ledger.record_interaction(&entry).await {
            tracing::error!(
                interaction_id = entry.id,
                user_id = %user.id,
                error = %e,
                "interaction audit write failed"
            );
        }

        tracing::info!(
            user_id = %user.id,
            prompt_tokens = completion.prompt_tokens,
            completion_tokens = completion.completion_tokens,
            "prompt served"
        );

        let embed = Embed {
            description: Some(PROMPT_HEADING.into()),
            footer: Some(truncate_chars(prompt, EMBED_FOOTER_LIMIT).to_string()),
            ..Embed::default()
        };
        self.say(command, Reply::text(completion.text).with_embed(embed))
            .await
    }
}
