use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Method, Response, header::HeaderMap};
use serde_json::json;
use tokio::time::sleep;

use super::types::{API_BASE, InteractionCallbackType};

const MAX_RATE_LIMIT_RETRIES: u8 = 3;

#[derive(Clone)]
pub struct DiscordHttpClient {
    client: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl DiscordHttpClient {
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, API_BASE)
    }

    #[must_use]
    pub fn with_base_url(bot_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            bot_token: bot_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let url = format!("{}/channels/{channel_id}/messages", self.base_url);
        let _response = self
            .request(
                Method::POST,
                &url,
                Some(json!({ "content": content })),
                None,
                MAX_RATE_LIMIT_RETRIES,
            )
            .await
            .context("send Discord message")?;
        Ok(())
    }

    pub async fn get_gateway_bot(&self) -> Result<serde_json::Value> {
        let url = format!("{}/gateway/bot", self.base_url);
        let response = self
            .request(Method::GET, &url, None, None, MAX_RATE_LIMIT_RETRIES)
            .await
            .context("fetch Discord gateway bot data")?;
        response
            .json()
            .await
            .context("parse Discord gateway bot JSON")
    }

    pub async fn defer_interaction(
        &self,
        interaction_id: &str,
        interaction_token: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/interactions/{interaction_id}/{interaction_token}/callback",
            self.base_url
        );
        let body = json!({
            "type": InteractionCallbackType::DeferredChannelMessageWithSource as u8
        });
        let _response = self
            .request(Method::POST, &url, Some(body), None, MAX_RATE_LIMIT_RETRIES)
            .await
            .context("defer Discord interaction")?;
        Ok(())
    }

    pub async fn create_followup_message(
        &self,
        application_id: &str,
        interaction_token: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}",
            self.base_url
        );
        let _response = self
            .request(Method::POST, &url, Some(body), None, MAX_RATE_LIMIT_RETRIES)
            .await
            .context("send Discord interaction follow-up")?;
        Ok(())
    }

    /// Time a guild member out until `until`. Single attempt: a rate-limited
    /// suspension is abandoned, not retried.
    pub async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: &str,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        let url = format!("{}/guilds/{guild_id}/members/{user_id}", self.base_url);
        let body = json!({ "communication_disabled_until": until.to_rfc3339() });
        let _response = self
            .request(Method::PATCH, &url, Some(body), Some(reason), 0)
            .await
            .context("time out Discord guild member")?;
        Ok(())
    }

    pub async fn register_commands(
        &self,
        application_id: &str,
        guild_id: Option<&str>,
        commands: &[serde_json::Value],
    ) -> Result<()> {
        let url = if let Some(guild) = guild_id {
            format!(
                "{}/applications/{application_id}/guilds/{guild}/commands",
                self.base_url
            )
        } else {
            format!("{}/applications/{application_id}/commands", self.base_url)
        };

        let _response = self
            .request(
                Method::PUT,
                &url,
                Some(json!(commands)),
                None,
                MAX_RATE_LIMIT_RETRIES,
            )
            .await
            .context("register Discord application commands")?;
        Ok(())
    }

    /// Send one REST call, retrying up to `retries` times on HTTP 429.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        audit_reason: Option<&str>,
        retries: u8,
    ) -> Result<Response> {
        for attempt in 0..=retries {
            let mut request_builder = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bot {}", self.bot_token));
            if let Some(reason) = audit_reason {
                request_builder = request_builder.header("X-Audit-Log-Reason", reason);
            }
            if let Some(payload) = &body {
                request_builder = request_builder.json(payload);
            }

            let response = request_builder
                .send()
                .await
                .with_context(|| format!("send Discord request {} {}", method.as_str(), url))?;

            if response.status().as_u16() == 429 {
                if attempt == retries {
                    anyhow::bail!(
                        "Discord request {} {} exceeded rate limit after {retries} retries",
                        method.as_str(),
                        url
                    );
                }
                let retry_after = Self::parse_retry_after(response.headers())
                    .unwrap_or_else(|| Duration::from_secs(1));
                tracing::warn!(
                    method = method.as_str(),
                    url,
                    global = Self::is_global_limit(response.headers()),
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "Discord rate limited; retrying"
                );
                sleep(retry_after).await;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status();
                let body_text = response
                    .text()
                    .await
                    .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
                anyhow::bail!(
                    "Discord request {} {} failed ({status}): {body_text}",
                    method.as_str(),
                    url
                );
            }

            return Ok(response);
        }

        anyhow::bail!(
            "Discord request {} {} failed due to rate limiting",
            method.as_str(),
            url
        )
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        let seconds = headers
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())?;
        if seconds <= 0.0 || !seconds.is_finite() {
            return Some(Duration::from_secs(0));
        }
        Some(Duration::from_secs_f64(seconds))
    }

    fn is_global_limit(headers: &HeaderMap) -> bool {
        headers
            .get("X-RateLimit-Global")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}
