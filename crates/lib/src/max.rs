//! MAX platform messaging API client (send message, typing indicator).

use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.max.ru/v1";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a send. Total: every call maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// 401 from the platform, or no secret configured at all.
    AuthFailed,
    /// 429 from the platform. No retry is performed at this layer.
    RateLimited,
    /// Timeout, connection failure, unexpected status, or bad input.
    TransportFailed { reason: String },
}

impl SendOutcome {
    /// Short machine-readable code, used in the webhook error body.
    pub fn short_code(&self) -> &'static str {
        match self {
            SendOutcome::Delivered => "delivered",
            SendOutcome::AuthFailed => "auth_failed",
            SendOutcome::RateLimited => "rate_limited",
            SendOutcome::TransportFailed { .. } => "transport_failed",
        }
    }
}

/// Client for the MAX send-message API. Requests carry the bot secret as a
/// bearer token.
#[derive(Clone)]
pub struct MaxClient {
    base_url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl MaxClient {
    pub fn new(secret: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            secret,
            client: reqwest::Client::new(),
        }
    }

    /// POST /messages with `{recipient:{user_id}, message:{text}}`.
    /// Short-circuits without a network call when no secret is configured or
    /// either input is empty. 10s timeout, no retries.
    pub async fn send(&self, recipient_id: &str, text: &str) -> SendOutcome {
        let Some(ref secret) = self.secret else {
            log::error!("max: no bot secret configured, cannot send");
            return SendOutcome::AuthFailed;
        };
        if recipient_id.is_empty() || text.is_empty() {
            log::error!("max: empty recipient or text, refusing to send");
            return SendOutcome::TransportFailed {
                reason: "empty recipient or text".to_string(),
            };
        }
        let url = format!("{}/messages", self.base_url);
        let payload = json!({
            "recipient": { "user_id": recipient_id },
            "message": { "text": text }
        });
        log::info!("max: sending message to {}", recipient_id);
        let res = self
            .client
            .post(&url)
            .bearer_auth(secret)
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await;
        match res {
            Ok(r) => {
                let outcome = classify_send(r.status().as_u16());
                match outcome {
                    SendOutcome::Delivered => {
                        log::info!("max: message delivered to {}", recipient_id)
                    }
                    ref other => log::error!(
                        "max: send to {} failed: {} ({})",
                        recipient_id,
                        other.short_code(),
                        r.status()
                    ),
                }
                outcome
            }
            Err(e) => {
                let reason = transport_reason(&e);
                log::error!("max: send to {} failed ({}): {}", recipient_id, reason, e);
                SendOutcome::TransportFailed { reason }
            }
        }
    }

    /// POST /actions with a typing indicator. Best-effort: failures are
    /// logged and swallowed, never surfaced to the caller. 5s timeout.
    pub async fn notify_typing(&self, recipient_id: &str) -> bool {
        let Some(ref secret) = self.secret else {
            return false;
        };
        if recipient_id.is_empty() {
            return false;
        }
        let url = format!("{}/actions", self.base_url);
        let payload = json!({
            "recipient": { "user_id": recipient_id },
            "action": "typing"
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(secret)
            .json(&payload)
            .timeout(TYPING_TIMEOUT)
            .send()
            .await;
        match res {
            Ok(r) if r.status().as_u16() == 200 => {
                log::debug!("max: typing indicator sent to {}", recipient_id);
                true
            }
            Ok(r) => {
                log::warn!("max: typing indicator for {} returned {}", recipient_id, r.status());
                false
            }
            Err(e) => {
                log::warn!("max: typing indicator for {} failed: {}", recipient_id, e);
                false
            }
        }
    }
}

/// Map a platform status code to a send outcome.
pub fn classify_send(status: u16) -> SendOutcome {
    match status {
        200 => SendOutcome::Delivered,
        401 => SendOutcome::AuthFailed,
        429 => SendOutcome::RateLimited,
        code => SendOutcome::TransportFailed {
            reason: format!("http_{}", code),
        },
    }
}

fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "connection".to_string()
    } else {
        "unknown".to_string()
    }
}
