#![allow(dead_code, unused_imports, clippy::needless_lifetimes)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use promptwarden::completion::{Completion, CompletionService};
use promptwarden::config::{LinksConfig, QuotaPolicy};
use promptwarden::error::{CompletionError, LedgerError};
use promptwarden::governance::ResetSchedule;
use promptwarden::ledger::{InteractionRecord, Ledger, SqliteLedger, UserId, UserRecord};
use promptwarden::orchestrator::Orchestrator;
use promptwarden::platform::{ChatMessage, CommandEvent, Platform, PlatformEvent, Reply};

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the fake platform was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Defer {
        command: String,
    },
    Reply(Reply),
    Notify {
        channel_id: String,
        text: String,
    },
    Suspend {
        guild_id: String,
        user: UserId,
        duration: Duration,
        reason: String,
    },
}

pub struct FakePlatform {
    calls: Mutex<Vec<PlatformCall>>,
    max_len: usize,
    /// Zero-based index of the reply call that should fail.
    fail_reply_at: Option<usize>,
    replies_seen: AtomicUsize,
    fail_suspend: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            max_len: 2000,
            fail_reply_at: None,
            replies_seen: AtomicUsize::new(0),
            fail_suspend: false,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn failing_reply_at(mut self, index: usize) -> Self {
        self.fail_reply_at = Some(index);
        self
    }

    pub fn failing_suspend(mut self) -> Self {
        self.fail_suspend = true;
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Reply(reply) => Some(reply),
                _ => None,
            })
            .collect()
    }

    pub fn suspensions(&self) -> Vec<(UserId, Duration, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Suspend {
                    user,
                    duration,
                    reason,
                    ..
                } => Some((user, duration, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Notify { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Platform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    fn max_message_length(&self) -> usize {
        self.max_len
    }

    fn mention(&self, user: UserId) -> String {
        format!("<@{user}>")
    }

    fn listen<'a>(
        &'a self,
        _tx: tokio::sync::mpsc::Sender<PlatformEvent>,
    ) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn defer<'a>(&'a self, command: &'a CommandEvent) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(PlatformCall::Defer {
                command: command.name.clone(),
            });
            Ok(())
        })
    }

    fn reply<'a>(
        &'a self,
        _command: &'a CommandEvent,
        reply: &'a Reply,
    ) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let index = self.replies_seen.fetch_add(1, Ordering::SeqCst);
            if self.fail_reply_at == Some(index) {
                anyhow::bail!("socket closed");
            }
            self.record(PlatformCall::Reply(reply.clone()));
            Ok(())
        })
    }

    fn notify<'a>(&'a self, channel_id: &'a str, text: &'a str) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(PlatformCall::Notify {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        })
    }

    fn suspend<'a>(
        &'a self,
        guild_id: &'a str,
        user: UserId,
        duration: Duration,
        reason: &'a str,
    ) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail_suspend {
                anyhow::bail!("missing permissions");
            }
            self.record(PlatformCall::Suspend {
                guild_id: guild_id.to_string(),
                user,
                duration,
                reason: reason.to_string(),
            });
            Ok(())
        })
    }
}

/// Completion double: answers with a fixed text or fails every call.
pub struct FakeCompletion {
    outcome: Result<String, String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeCompletion {
    pub fn answering(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(system_prompt, prompt)` pairs in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

impl CompletionService for FakeCompletion {
    fn model(&self) -> &str {
        "fake-model"
    }

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        prompt: &'a str,
    ) -> BoxFut<'a, Result<Completion, CompletionError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), prompt.to_string()));
            match &self.outcome {
                Ok(text) => Ok(Completion {
                    text: text.clone(),
                    prompt_tokens: 11,
                    completion_tokens: 22,
                }),
                Err(message) => Err(CompletionError::Request(message.clone())),
            }
        })
    }
}

pub const SYSTEM_PROMPT: &str = "You are a terse assistant.";

pub async fn memory_ledger() -> Arc<SqliteLedger> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(SqliteLedger::new(pool).await.unwrap())
}

/// Ledger operations [`FailingLedger`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    GetUser,
    IncrementUse,
}

/// SQLite ledger that fails one operation as if the pool were exhausted.
pub struct FailingLedger {
    inner: Arc<SqliteLedger>,
    fail_on: LedgerOp,
}

impl FailingLedger {
    pub fn new(inner: Arc<SqliteLedger>, fail_on: LedgerOp) -> Self {
        Self { inner, fail_on }
    }

    fn check(&self, op: LedgerOp) -> Result<(), LedgerError> {
        if self.fail_on == op {
            return Err(LedgerError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

impl Ledger for FailingLedger {
    fn get_user<'a>(&'a self, id: UserId) -> BoxFut<'a, Result<Option<UserRecord>, LedgerError>> {
        Box::pin(async move {
            self.check(LedgerOp::GetUser)?;
            self.inner.get_user(id).await
        })
    }

    fn insert_user<'a>(
        &'a self,
        id: UserId,
        name: &'a str,
    ) -> BoxFut<'a, Result<UserRecord, LedgerError>> {
        self.inner.insert_user(id, name)
    }

    fn rename_user<'a>(&'a self, id: UserId, name: &'a str) -> BoxFut<'a, Result<(), LedgerError>> {
        self.inner.rename_user(id, name)
    }

    fn increment_use<'a>(&'a self, id: UserId) -> BoxFut<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            self.check(LedgerOp::IncrementUse)?;
            self.inner.increment_use(id).await
        })
    }

    fn refund_use<'a>(&'a self, id: UserId) -> BoxFut<'a, Result<(), LedgerError>> {
        self.inner.refund_use(id)
    }

    fn reset_all_uses<'a>(&'a self) -> BoxFut<'a, Result<u64, LedgerError>> {
        self.inner.reset_all_uses()
    }

    fn record_interaction<'a>(
        &'a self,
        entry: &'a InteractionRecord,
    ) -> BoxFut<'a, Result<(), LedgerError>> {
        self.inner.record_interaction(entry)
    }
}

pub async fn set_tier(ledger: &SqliteLedger, user: UserId, tier: i64) {
    sqlx::query("UPDATE Users SET MemberStatus = $1 WHERE ID = $2")
        .bind(tier)
        .bind(i64::try_from(user.0).unwrap())
        .execute(ledger.pool())
        .await
        .unwrap();
}

pub async fn message_rows(ledger: &SqliteLedger) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM Messages")
        .fetch_one(ledger.pool())
        .await
        .unwrap()
}

/// 10:00 UTC, three hours before the default 11:00 UTC+11 midnight boundary.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn aedt_midnight() -> ResetSchedule {
    ResetSchedule::new(
        FixedOffset::east_opt(11 * 3600).unwrap(),
        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
    )
}

pub fn orchestrator(
    ledger: Arc<impl Ledger + 'static>,
    completion: Arc<FakeCompletion>,
    platform: Arc<FakePlatform>,
) -> Orchestrator {
    Orchestrator::new(
        ledger,
        completion,
        platform,
        &QuotaPolicy::default(),
        aedt_midnight(),
        LinksConfig::default(),
        SYSTEM_PROMPT,
    )
    .with_clock(fixed_now)
}

pub fn command(id: u64, name: &str, user: u64, options: &[(&str, &str)]) -> CommandEvent {
    CommandEvent {
        id,
        token: format!("token-{id}"),
        name: name.to_string(),
        options: options
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        user_id: UserId(user),
        user_name: format!("user{user}"),
        guild_id: Some("guild-1".to_string()),
        channel_id: "channel-1".to_string(),
        received_at: fixed_now(),
        raw: serde_json::json!({ "id": id.to_string(), "data": { "name": name } }),
    }
}

pub fn prompt_command(id: u64, user: u64, prompt: &str) -> CommandEvent {
    command(id, "prompt", user, &[("prompt", prompt)])
}

pub fn chat_message(id: u64, author: u64, sent_at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        author_id: UserId(author),
        author_is_bot: false,
        channel_id: "channel-1".to_string(),
        guild_id: Some("guild-1".to_string()),
        sent_at,
    }
}
