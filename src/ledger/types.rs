use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use std::fmt;

/// Timestamp layout of the `Messages.timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// Platform-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl UserId {
    pub(crate) fn to_sql(self) -> Result<i64, LedgerError> {
        i64::try_from(self.0).map_err(|_| LedgerError::IdOutOfRange(self.0))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of `Users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    /// Last-seen display name.
    pub name: String,
    /// Membership tier; negative tiers bypass the daily allowance.
    pub tier: i64,
    /// Prompts used since the last reset boundary.
    pub uses: u32,
}

/// Immutable audit entry for one served prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    /// Platform interaction id.
    pub id: u64,
    pub user_id: UserId,
    /// Serialized inbound event.
    pub raw: String,
    pub prompt: String,
    pub response: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn formatted_timestamp(&self) -> String {
        self.created_at.format(TIMESTAMP_FORMAT).to_string()
    }
}
