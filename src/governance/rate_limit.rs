//! In-memory abuse limiters.
//!
//! Both limiters are plain state machines driven through `&mut self`; the
//! dispatcher loop owns them outright, so no lock is ever taken. Issuing the
//! actual suspension is the caller's job.

use crate::config::QuotaPolicy;
use crate::ledger::UserId;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};

/// Outcome of a command-burst check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDecision {
    Allowed,
    /// Over the burst threshold; the command was not recorded.
    Limited,
}

/// Outcome of a chat-flood check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    Quiet,
    /// Threshold reached inside the window; the user's buffer was cleared.
    Flooding,
}

/// Sliding window over recent commands, evicted by age.
#[derive(Debug)]
pub struct CommandLimiter {
    limit: usize,
    window: TimeDelta,
    windows: HashMap<UserId, VecDeque<DateTime<Utc>>>,
}

impl CommandLimiter {
    pub fn new(limit: usize, window: TimeDelta) -> Self {
        Self {
            limit,
            window,
            windows: HashMap::new(),
        }
    }

    pub fn check(&mut self, user: UserId, now: DateTime<Utc>) -> CommandDecision {
        let timestamps = self.windows.entry(user).or_default();
        timestamps.retain(|t| now - *t <= self.window);

        if timestamps.len() >= self.limit {
            return CommandDecision::Limited;
        }

        timestamps.push_back(now);
        CommandDecision::Allowed
    }

    fn evict_idle(&mut self, now: DateTime<Utc>, idle_after: TimeDelta) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, timestamps| timestamps.back().is_some_and(|t| now - *t < idle_after));
        before - self.windows.len()
    }
}

/// Trailing buffer of the last N chat messages per user.
#[derive(Debug)]
pub struct FloodDetector {
    limit: usize,
    window: TimeDelta,
    buffers: HashMap<UserId, VecDeque<DateTime<Utc>>>,
}

impl FloodDetector {
    pub fn new(limit: usize, window: TimeDelta) -> Self {
        Self {
            limit,
            window,
            buffers: HashMap::new(),
        }
    }

    pub fn observe(&mut self, user: UserId, at: DateTime<Utc>) -> FloodDecision {
        let buffer = self.buffers.entry(user).or_default();
        buffer.push_back(at);
        while buffer.len() > self.limit {
            buffer.pop_front();
        }

        let flooding = buffer.len() == self.limit
            && match (buffer.front(), buffer.back()) {
                (Some(oldest), Some(newest)) => *newest - *oldest < self.window,
                _ => false,
            };

        if flooding {
            self.buffers.remove(&user);
            FloodDecision::Flooding
        } else {
            FloodDecision::Quiet
        }
    }

    fn evict_idle(&mut self, now: DateTime<Utc>, idle_after: TimeDelta) -> usize {
        let before = self.buffers.len();
        self.buffers
            .retain(|_, buffer| buffer.back().is_some_and(|t| now - *t < idle_after));
        before - self.buffers.len()
    }
}

/// Owns both limiters and the idle-eviction policy for their windows.
#[derive(Debug)]
pub struct AbuseGuard {
    commands: CommandLimiter,
    flood: FloodDetector,
    idle_after: TimeDelta,
}

impl AbuseGuard {
    pub fn new(commands: CommandLimiter, flood: FloodDetector, idle_after: TimeDelta) -> Self {
        Self {
            commands,
            flood,
            idle_after,
        }
    }

    pub fn from_policy(policy: &QuotaPolicy) -> Self {
        Self::new(
            CommandLimiter::new(policy.command_burst_limit, policy.command_burst_window()),
            FloodDetector::new(policy.flood_message_limit, policy.flood_window()),
            policy.idle_eviction(),
        )
    }

    pub fn check_command(&mut self, user: UserId, now: DateTime<Utc>) -> CommandDecision {
        self.commands.check(user, now)
    }

    pub fn check_message(&mut self, user: UserId, at: DateTime<Utc>) -> FloodDecision {
        self.flood.observe(user, at)
    }

    /// Drop windows whose newest event is older than the idle age. Returns
    /// how many per-user windows were released.
    pub fn evict_idle(&mut self, now: DateTime<Utc>) -> usize {
        self.commands.evict_idle(now, self.idle_after) + self.flood.evict_idle(now, self.idle_after)
    }

    pub fn tracked_windows(&self) -> usize {
        self.commands.windows.len() + self.flood.buffers.len()
    }
}
