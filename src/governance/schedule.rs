use crate::config::QuotaPolicy;
use crate::error::ConfigError;
use crate::ledger::Ledger;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Daily reset boundary: a wall-clock time in a fixed-offset time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    offset: FixedOffset,
    at: NaiveTime,
}

impl ResetSchedule {
    pub fn new(offset: FixedOffset, at: NaiveTime) -> Self {
        Self { offset, at }
    }

    pub fn from_policy(policy: &QuotaPolicy) -> Result<Self, ConfigError> {
        Ok(Self::new(policy.reset_offset()?, policy.reset_time))
    }

    /// First boundary strictly after `now`. A `now` sitting exactly on
    /// today's boundary targets tomorrow.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_today = now.with_timezone(&self.offset).date_naive().and_time(self.at);
        let offset = TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        let target = Utc.from_utc_datetime(&(local_today - offset));

        if now >= target {
            target + TimeDelta::days(1)
        } else {
            target
        }
    }

    pub fn time_until_next(&self, now: DateTime<Utc>) -> TimeDelta {
        self.next_after(now) - now
    }
}

/// Reset every daily counter at each boundary until `cancel` fires.
///
/// The next boundary is recomputed from the wall clock on every iteration,
/// so a late start neither skips nor repeats a reset.
pub async fn run_quota_scheduler(
    ledger: Arc<dyn Ledger>,
    schedule: ResetSchedule,
    cancel: CancellationToken,
) {
    run_with_clock(ledger, schedule, Utc::now, cancel).await;
}

async fn run_with_clock<C>(
    ledger: Arc<dyn Ledger>,
    schedule: ResetSchedule,
    mut clock: C,
    cancel: CancellationToken,
) where
    C: FnMut() -> DateTime<Utc>,
{
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let now = clock();
        // A timer that wakes a little before the wall-clock boundary must not
        // schedule the same boundary twice.
        let from = last_fired.map_or(now, |fired| now.max(fired));
        let target = schedule.next_after(from);
        let wait = (target - now).to_std().unwrap_or(Duration::ZERO);

        tracing::info!(
            next_reset = %target,
            wait_secs = wait.as_secs(),
            "quota reset scheduled"
        );

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("quota scheduler stopping");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        match ledger.reset_all_uses().await {
            Ok(rows) => tracing::info!(rows, "daily usage counters reset"),
            Err(e) => tracing::error!(error = %e, "daily usage reset failed"),
        }
        last_fired = Some(target);
    }
}
