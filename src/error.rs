use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Failures a command handler can end with.
///
/// The orchestrator answers `Ledger` and `Completion` with an apology and
/// propagates `Delivery`. Startup and platform glue report `ConfigError` and
/// `TransportError` through `anyhow` context chains instead.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Ledger ──────────────────────────────────────────────────────────
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    // ── Completion service ──────────────────────────────────────────────
    #[error("completion: {0}")]
    Completion(#[from] CompletionError),

    // ── Response delivery ───────────────────────────────────────────────
    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryError),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Ledger errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("identifier {0} does not fit a sqlite integer")]
    IdOutOfRange(u64),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("user {0} vanished after insert")]
    MissingUser(u64),
}

// ─── Completion errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("api key not set")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no choices")]
    Empty,
}

// ─── Delivery errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chunk {index} of response could not be sent: {message}")]
    Chunk { index: usize, message: String },
}

// ─── Transport errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("platform {platform} connection failed: {message}")]
    Connection { platform: String, message: String },

    #[error("gateway: {0}")]
    Gateway(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WardenError>;
