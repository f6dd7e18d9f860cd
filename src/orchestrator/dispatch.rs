use super::Orchestrator;
use crate::config::QuotaPolicy;
use crate::governance::{AbuseGuard, CommandDecision, FloodDecision};
use crate::ledger::UserId;
use crate::platform::{ChatMessage, CommandEvent, Platform, PlatformEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const COMMAND_SPAM_REASON: &str = "Spamming commands";
pub const CHAT_SPAM_REASON: &str = "Spamming in chat";

/// Single consumer of platform events.
///
/// Owns the abuse guard outright, so rate checks run synchronously in event
/// order without locks. Admitted commands run as their own tasks so a slow
/// completion delays only its own reply.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    platform: Arc<dyn Platform>,
    guard: AbuseGuard,
    suspension: Duration,
    sweep_every: Duration,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        platform: Arc<dyn Platform>,
        policy: &QuotaPolicy,
    ) -> Self {
        Self {
            orchestrator,
            platform,
            guard: AbuseGuard::from_policy(policy),
            suspension: policy.suspension(),
            sweep_every: policy.eviction_sweep(),
            tasks: JoinSet::new(),
        }
    }

    /// Consume events until the channel closes or `cancel` fires, then wait
    /// for in-flight commands to finish.
    pub async fn run(mut self, mut events: mpsc::Receiver<PlatformEvent>, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(self.sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        sweep.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("dispatcher stopping");
                    break;
                }
                _ = sweep.tick() => {
                    let evicted = self.guard.evict_idle(Utc::now());
                    tracing::debug!(
                        evicted,
                        tracked = self.guard.tracked_windows(),
                        "idle rate windows swept"
                    );
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "command task aborted");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("platform event stream closed");
                        break;
                    };
                    self.dispatch(event);
                }
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "command task aborted");
            }
        }
    }

    fn dispatch(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Command(command) => self.dispatch_command(command),
            PlatformEvent::Message(message) => self.dispatch_message(&message),
        }
    }

    fn dispatch_command(&mut self, command: CommandEvent) {
        let decision = self
            .guard
            .check_command(command.user_id, command.received_at);
        let orchestrator = Arc::clone(&self.orchestrator);
        let platform = Arc::clone(&self.platform);
        let suspension = self.suspension;

        self.tasks.spawn(async move {
            if let Err(e) = platform.defer(&command).await {
                tracing::warn!(
                    command = %command.name,
                    user_id = %command.user_id,
                    error = %format!("{e:#}"),
                    "command acknowledgement failed"
                );
                return;
            }

            match decision {
                CommandDecision::Limited => {
                    tracing::info!(
                        command = %command.name,
                        user_id = %command.user_id,
                        "command burst limit hit"
                    );
                    suspend_member(
                        platform.as_ref(),
                        command.guild_id.as_deref(),
                        command.user_id,
                        suspension,
                        COMMAND_SPAM_REASON,
                    )
                    .await;
                }
                CommandDecision::Allowed => {
                    if let Err(e) = orchestrator.handle(&command).await {
                        tracing::error!(
                            command = %command.name,
                            user_id = %command.user_id,
                            error = %e,
                            "command failed"
                        );
                    }
                }
            }
        });
    }

    fn dispatch_message(&mut self, message: &ChatMessage) {
        if message.author_is_bot {
            return;
        }
        if self.guard.check_message(message.author_id, message.sent_at) != FloodDecision::Flooding
        {
            return;
        }

        let platform = Arc::clone(&self.platform);
        let suspension = self.suspension;
        let user = message.author_id;
        let guild_id = message.guild_id.clone();
        let channel_id = message.channel_id.clone();

        self.tasks.spawn(async move {
            suspend_member(
                platform.as_ref(),
                guild_id.as_deref(),
                user,
                suspension,
                CHAT_SPAM_REASON,
            )
            .await;

            let notice = format!(
                "{} has been timed out for {} seconds. Reason: {CHAT_SPAM_REASON}",
                platform.mention(user),
                suspension.as_secs()
            );
            if let Err(e) = platform.notify(&channel_id, &notice).await {
                tracing::warn!(user_id = %user, error = %format!("{e:#}"), "flood notice failed");
            }
        });
    }
}

/// Best-effort suspension; failures are logged, never retried. Direct
/// messages have no guild and count as a failed suspension.
async fn suspend_member(
    platform: &dyn Platform,
    guild_id: Option<&str>,
    user: UserId,
    duration: Duration,
    reason: &str,
) {
    let Some(guild_id) = guild_id else {
        tracing::warn!(user_id = %user, reason, "no guild to suspend in");
        return;
    };

    match platform.suspend(guild_id, user, duration, reason).await {
        Ok(()) => tracing::info!(
            user_id = %user,
            seconds = duration.as_secs(),
            reason,
            "user suspended"
        ),
        Err(e) => {
            tracing::error!(user_id = %user, reason, error = %format!("{e:#}"), "suspension failed");
        }
    }
}
