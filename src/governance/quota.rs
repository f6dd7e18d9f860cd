use chrono::TimeDelta;
use std::fmt;

/// A user may prompt when their tier is negative (unlimited) or they have
/// uses left today.
pub fn is_eligible(tier: i64, uses: u32, allowance: u32) -> bool {
    tier < 0 || uses < allowance
}

pub fn prompts_left(uses: u32, allowance: u32) -> u32 {
    allowance.saturating_sub(uses)
}

/// Whole hours and minutes until the next reset, for user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIn {
    pub hours: i64,
    pub minutes: i64,
}

impl From<TimeDelta> for RefreshIn {
    fn from(remaining: TimeDelta) -> Self {
        let total_minutes = remaining.num_minutes().max(0);
        Self {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

impl fmt::Display for RefreshIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hours and {} mins", self.hours, self.minutes)
    }
}
