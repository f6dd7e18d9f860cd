//! Usage governance: quota eligibility, the daily reset schedule and the
//! in-memory abuse limiters.

pub mod quota;
pub mod rate_limit;
pub mod schedule;

pub use quota::{RefreshIn, is_eligible, prompts_left};
pub use rate_limit::{AbuseGuard, CommandDecision, CommandLimiter, FloodDecision, FloodDetector};
pub use schedule::{ResetSchedule, run_quota_scheduler};
