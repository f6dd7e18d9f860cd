#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::Result;
use promptwarden::{Config, app, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    // This prevents the error: "could not automatically determine the process-level CryptoProvider"
    // when both aws-lc-rs and ring features are available (or neither is explicitly selected).
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    // A missing .env is normal in production.
    dotenvy::dotenv().ok();

    let config = Config::load_from_env()?;
    let _log_guard = logging::init(&config.logging)?;
    tracing::info!(config = %config.config_path.display(), "configuration loaded");

    app::run(config).await
}
