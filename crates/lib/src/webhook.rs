//! Webhook dispatch: validate an inbound platform request, route the message
//! text to a command or a weather lookup, send the reply, and map the outcome
//! to the response returned to the platform.
//!
//! The dispatcher is total: every request yields exactly one
//! [`DispatchResponse`], whatever the upstreams do.

use crate::config::SignaturePolicy;
use crate::max::{MaxClient, SendOutcome};
use crate::signature;
use crate::weather::{DetailLevel, WeatherClient, WeatherResult};
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{json, Value};

/// Header the platform uses for the HMAC signature of the body.
/// `HeaderMap` lookups are case-insensitive, so any spelling matches.
pub const SIGNATURE_HEADER: &str = "x-max-signature";

const GREETING_REPLY: &str = "🌤 Погодный бот готов! Напишите название города.";
const HELP_REPLY: &str = "🆘 Напишите название города для получения погоды.";

/// One inbound message in canonical form, whichever payload shape carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub sender_id: String,
    /// Trimmed, non-empty.
    pub text: String,
}

/// Why a payload could not be reduced to a [`ParsedMessage`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no sender id in any known payload shape")]
    MissingSender,
    #[error("missing or empty message text")]
    MissingText,
}

/// What goes back to the platform: an HTTP status and a small JSON body.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl DispatchResponse {
    fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "status": "ok" }),
        }
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "status": "error", "message": message }),
        }
    }
}

/// Orchestrates one webhook request: validation, signature policy, field
/// extraction, command/weather routing, reply delivery.
pub struct Dispatcher {
    weather: WeatherClient,
    max: MaxClient,
    secret: Option<String>,
    signature_policy: SignaturePolicy,
}

impl Dispatcher {
    pub fn new(
        weather: WeatherClient,
        max: MaxClient,
        secret: Option<String>,
        signature_policy: SignaturePolicy,
    ) -> Self {
        Self {
            weather,
            max,
            secret,
            signature_policy,
        }
    }

    /// Run one request through the full pipeline.
    pub async fn dispatch(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> DispatchResponse {
        if method != Method::POST {
            return DispatchResponse::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }
        if body.is_empty() {
            log::warn!("webhook: empty body");
            return DispatchResponse::error(StatusCode::BAD_REQUEST, "empty body");
        }
        let data: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("webhook: invalid JSON: {}", e);
                return DispatchResponse::error(StatusCode::BAD_REQUEST, "invalid JSON");
            }
        };
        if let Some(rejection) = self.check_signature(headers, body) {
            return rejection;
        }
        let msg = match extract_message(&data) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("webhook: {}", e);
                return DispatchResponse::error(StatusCode::BAD_REQUEST, "missing user id or text");
            }
        };
        log::info!("webhook: message from {}: {}", msg.sender_id, msg.text);
        let reply = self.reply_for(&msg).await;
        match self.max.send(&msg.sender_id, &reply).await {
            SendOutcome::Delivered => DispatchResponse::ok(),
            outcome => {
                log::error!(
                    "webhook: reply to {} not delivered: {}",
                    msg.sender_id,
                    outcome.short_code()
                );
                DispatchResponse::error(StatusCode::INTERNAL_SERVER_ERROR, outcome.short_code())
            }
        }
    }

    /// Signature policy: a present header must verify against the raw body;
    /// an absent header is accepted with a warning or rejected per config.
    /// With no secret configured there is nothing to verify against.
    fn check_signature(&self, headers: &HeaderMap, body: &[u8]) -> Option<DispatchResponse> {
        let secret = self.secret.as_deref()?;
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        match provided {
            Some(sig) => {
                if signature::verify(body, sig, secret) {
                    None
                } else {
                    log::warn!("webhook: signature mismatch");
                    Some(DispatchResponse::error(
                        StatusCode::FORBIDDEN,
                        "invalid signature",
                    ))
                }
            }
            None => match self.signature_policy {
                SignaturePolicy::WarnAndAllow => {
                    log::warn!(
                        "webhook: no {} header, skipping signature verification",
                        SIGNATURE_HEADER
                    );
                    None
                }
                SignaturePolicy::Reject => Some(DispatchResponse::error(
                    StatusCode::FORBIDDEN,
                    "missing signature",
                )),
            },
        }
    }

    /// Route the text: fixed command replies answer immediately; anything
    /// else is a place name for a weather lookup, preceded by a best-effort
    /// typing indicator.
    async fn reply_for(&self, msg: &ParsedMessage) -> String {
        let lowered = msg.text.to_lowercase();
        if lowered == "/start" || lowered == "старт" {
            return GREETING_REPLY.to_string();
        }
        if lowered == "/help" || lowered == "помощь" {
            return HELP_REPLY.to_string();
        }
        self.max.notify_typing(&msg.sender_id).await;
        weather_reply(self.weather.fetch(&msg.text, DetailLevel::Short).await)
    }
}

/// Locate sender id and message text, trying payload shapes in precedence
/// order: `message.from.id` (bot API deliveries) first, then
/// `sender.user_id` (platform webhook deliveries). Ids may be JSON strings
/// or numbers; text always lives at `message.text`.
pub fn extract_message(data: &Value) -> Result<ParsedMessage, ExtractError> {
    let sender_id = data
        .pointer("/message/from/id")
        .and_then(id_string)
        .or_else(|| data.pointer("/sender/user_id").and_then(id_string))
        .ok_or(ExtractError::MissingSender)?;
    let text = data
        .pointer("/message/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if text.is_empty() {
        return Err(ExtractError::MissingText);
    }
    Ok(ParsedMessage {
        sender_id,
        text: text.to_string(),
    })
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map a weather outcome to the user-facing reply text. Transient failures
/// become apologies, so the user always gets some answer.
pub fn weather_reply(result: WeatherResult) -> String {
    match result {
        WeatherResult::Success { text } => text,
        WeatherResult::NotFound { place } => format!(
            "❌ Город '{}' не найден. Проверьте правильность написания.",
            place
        ),
        WeatherResult::TransientFailure { reason } => match reason.as_str() {
            "timeout" => "❌ Превышено время ожидания. Попробуйте позже.".to_string(),
            "connection" => {
                "❌ Проблемы с подключением к сервису погоды. Попробуйте позже.".to_string()
            }
            _ => "❌ Временные проблемы с сервисом погоды. Попробуйте позже.".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    // Nothing listens here; used when a scenario must not need an upstream.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn dispatcher(
        weather_base: &str,
        max_base: &str,
        secret: Option<&str>,
        policy: SignaturePolicy,
    ) -> Dispatcher {
        Dispatcher::new(
            WeatherClient::new(Some(weather_base.to_string())),
            MaxClient::new(secret.map(str::to_string), Some(max_base.to_string())),
            secret.map(str::to_string),
            policy,
        )
    }

    async fn post(d: &Dispatcher, body: &str) -> DispatchResponse {
        d.dispatch(&Method::POST, &HeaderMap::new(), body.as_bytes())
            .await
    }

    fn signed_headers(body: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            signature::sign(body.as_bytes(), secret).parse().expect("header value"),
        );
        headers
    }

    #[test]
    fn extraction_prefers_message_from_id() {
        let data = serde_json::json!({
            "message": { "from": { "id": 1 }, "text": "Москва" },
            "sender": { "user_id": 2 }
        });
        let msg = extract_message(&data).expect("extract");
        assert_eq!(msg.sender_id, "1");
        assert_eq!(msg.text, "Москва");
    }

    #[test]
    fn extraction_falls_back_to_sender_user_id() {
        let data = serde_json::json!({
            "sender": { "user_id": 42 },
            "message": { "text": "  Казань  " }
        });
        let msg = extract_message(&data).expect("extract");
        assert_eq!(msg.sender_id, "42");
        assert_eq!(msg.text, "Казань");
    }

    #[test]
    fn extraction_rejects_missing_sender_and_blank_text() {
        assert_eq!(
            extract_message(&serde_json::json!({})),
            Err(ExtractError::MissingSender)
        );
        assert_eq!(
            extract_message(&serde_json::json!({
                "sender": { "user_id": "u1" },
                "message": { "text": "   " }
            })),
            Err(ExtractError::MissingText)
        );
    }

    #[test]
    fn not_found_reply_contains_place_name() {
        let reply = weather_reply(WeatherResult::NotFound {
            place: "Москва".to_string(),
        });
        assert!(reply.contains("Москва"));
        assert!(reply.contains("не найден"));
    }

    #[test]
    fn transient_replies_by_reason() {
        let timeout = weather_reply(WeatherResult::TransientFailure {
            reason: "timeout".to_string(),
        });
        assert!(timeout.contains("время ожидания"));
        let conn = weather_reply(WeatherResult::TransientFailure {
            reason: "connection".to_string(),
        });
        assert!(conn.contains("подключением"));
        let other = weather_reply(WeatherResult::TransientFailure {
            reason: "http_503".to_string(),
        });
        assert!(other.contains("Временные проблемы"));
    }

    #[tokio::test]
    async fn delivers_weather_reply_and_returns_ok() {
        let weather = MockServer::start();
        let max = MockServer::start();
        weather.mock(|when, then| {
            when.method(GET);
            then.status(200).body("Москва: ☀️ +20°C");
        });
        let send = max.mock(|when, then| {
            when.method(POST)
                .path("/messages")
                .body_includes("Погода в городе Москва");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(
            &weather.base_url(),
            &max.base_url(),
            Some("s3cret"),
            SignaturePolicy::WarnAndAllow,
        );
        let res = post(&d, r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, serde_json::json!({ "status": "ok" }));
        send.assert();
    }

    #[tokio::test]
    async fn unknown_place_still_returns_ok_when_delivered() {
        let weather = MockServer::start();
        let max = MockServer::start();
        weather.mock(|when, then| {
            when.method(GET);
            then.status(404).body("not found");
        });
        let send = max.mock(|when, then| {
            when.method(POST)
                .path("/messages")
                .body_includes("Москва")
                .body_includes("не найден");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(
            &weather.base_url(),
            &max.base_url(),
            Some("s3cret"),
            SignaturePolicy::WarnAndAllow,
        );
        let res = post(&d, r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#).await;
        assert_eq!(res.status, StatusCode::OK);
        send.assert();
    }

    #[tokio::test]
    async fn send_auth_failure_maps_to_500() {
        let weather = MockServer::start();
        let max = MockServer::start();
        weather.mock(|when, then| {
            when.method(GET);
            then.status(200).body("Москва: ☀️ +20°C");
        });
        max.mock(|when, then| {
            when.method(POST).path("/messages");
            then.status(401).body("bad token");
        });
        let d = dispatcher(
            &weather.base_url(),
            &max.base_url(),
            Some("s3cret"),
            SignaturePolicy::WarnAndAllow,
        );
        let res = post(&d, r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#).await;
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            res.body,
            serde_json::json!({ "status": "error", "message": "auth_failed" })
        );
    }

    #[tokio::test]
    async fn non_post_method_is_405() {
        let d = dispatcher(UNREACHABLE, UNREACHABLE, Some("s3cret"), SignaturePolicy::WarnAndAllow);
        let res = d
            .dispatch(&Method::GET, &HeaderMap::new(), b"{}")
            .await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_requests_are_400() {
        let d = dispatcher(UNREACHABLE, UNREACHABLE, Some("s3cret"), SignaturePolicy::WarnAndAllow);
        assert_eq!(post(&d, "").await.status, StatusCode::BAD_REQUEST);
        assert_eq!(post(&d, "not json").await.status, StatusCode::BAD_REQUEST);
        assert_eq!(post(&d, "{}").await.status, StatusCode::BAD_REQUEST);
        let blank = r#"{"sender":{"user_id":"u1"},"message":{"text":"   "}}"#;
        assert_eq!(post(&d, blank).await.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_mismatch_is_403_with_no_outbound_calls() {
        let weather = MockServer::start();
        let max = MockServer::start();
        let weather_mock = weather.mock(|when, then| {
            when.method(GET);
            then.status(200).body("Москва: ☀️ +20°C");
        });
        let send_mock = max.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(
            &weather.base_url(),
            &max.base_url(),
            Some("s3cret"),
            SignaturePolicy::WarnAndAllow,
        );
        let body = r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#;
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "deadbeef".parse().expect("header value"));
        let res = d.dispatch(&Method::POST, &headers, body.as_bytes()).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        weather_mock.assert_hits(0);
        send_mock.assert_hits(0);
    }

    #[tokio::test]
    async fn valid_signature_passes_through() {
        let weather = MockServer::start();
        let max = MockServer::start();
        weather.mock(|when, then| {
            when.method(GET);
            then.status(200).body("Москва: ☀️ +20°C");
        });
        max.mock(|when, then| {
            when.method(POST).path("/messages");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(
            &weather.base_url(),
            &max.base_url(),
            Some("s3cret"),
            SignaturePolicy::WarnAndAllow,
        );
        let body = r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#;
        let headers = signed_headers(body, "s3cret");
        let res = d.dispatch(&Method::POST, &headers, body.as_bytes()).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reject_policy_refuses_unsigned_webhooks() {
        let d = dispatcher(UNREACHABLE, UNREACHABLE, Some("s3cret"), SignaturePolicy::Reject);
        let body = r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#;
        let res = post(&d, body).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn commands_answer_without_the_weather_service() {
        // Weather base is unreachable on purpose: command replies must not
        // depend on it.
        let max = MockServer::start();
        let send = max.mock(|when, then| {
            when.method(POST)
                .path("/messages")
                .body_includes("Погодный бот готов");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(UNREACHABLE, &max.base_url(), Some("s3cret"), SignaturePolicy::WarnAndAllow);
        for text in ["/start", "СТАРТ", "Старт"] {
            let body = format!(r#"{{"message":{{"from":{{"id":"u1"}},"text":"{}"}}}}"#, text);
            let res = post(&d, &body).await;
            assert_eq!(res.status, StatusCode::OK, "text: {}", text);
        }
        send.assert_hits(3);
    }

    #[tokio::test]
    async fn help_command_sends_help_text() {
        let max = MockServer::start();
        let send = max.mock(|when, then| {
            when.method(POST)
                .path("/messages")
                .body_includes("для получения погоды");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(UNREACHABLE, &max.base_url(), Some("s3cret"), SignaturePolicy::WarnAndAllow);
        for text in ["/help", "Помощь"] {
            let body = format!(r#"{{"message":{{"from":{{"id":"u1"}},"text":"{}"}}}}"#, text);
            let res = post(&d, &body).await;
            assert_eq!(res.status, StatusCode::OK, "text: {}", text);
        }
        send.assert_hits(2);
    }

    #[tokio::test]
    async fn weather_outage_still_delivers_an_apology() {
        let max = MockServer::start();
        let send = max.mock(|when, then| {
            when.method(POST).path("/messages").body_includes("Попробуйте позже");
            then.status(200).json_body(serde_json::json!({}));
        });
        let d = dispatcher(UNREACHABLE, &max.base_url(), Some("s3cret"), SignaturePolicy::WarnAndAllow);
        let res = post(&d, r#"{"message":{"from":{"id":"u1"},"text":"Москва"}}"#).await;
        assert_eq!(res.status, StatusCode::OK);
        send.assert();
    }
}
