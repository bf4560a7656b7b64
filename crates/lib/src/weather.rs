//! Weather lookup against the wttr.in text service.
//!
//! Every call resolves to a [`WeatherResult`] variant; transport and service
//! failures are classified, never propagated as errors.

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://wttr.in";
const USER_AGENT: &str = "MAX Weather Bot";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// wttr.in answers 200 with this prefix for places it cannot resolve.
const UNKNOWN_LOCATION_SENTINEL: &str = "Unknown location";

/// Multi-field wttr.in format: location, condition, temperature, humidity,
/// wind, precipitation, pressure.
const DETAILED_FORMAT: &str = "%l:+%c+%t+%h+%w+%p+%P\n";

/// One-line summary (default) or the multi-field forecast format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetailLevel {
    #[default]
    Short,
    Detailed,
}

/// Outcome of a weather lookup. Total: every call maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherResult {
    /// Weather text ready for display, including the place-name header line.
    Success { text: String },
    /// The service does not know the place.
    NotFound { place: String },
    /// Timeout, connection failure, or an unexpected status. `reason` is a
    /// short machine-readable code: `timeout`, `connection`, `http_<code>`,
    /// or `unknown`.
    TransientFailure { reason: String },
}

/// Client for the wttr.in text weather API.
#[derive(Clone)]
pub struct WeatherClient {
    base_url: String,
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// GET `<base>/<place>?format=...&lang=ru&M=` with a 10s timeout.
    /// `place` must be non-empty after trimming; the dispatcher rejects empty
    /// text before calling here. No retries.
    pub async fn fetch(&self, place: &str, detail: DetailLevel) -> WeatherResult {
        let place = place.trim();
        let url = format!("{}/{}", self.base_url, place);
        let format_param = match detail {
            DetailLevel::Short => "3",
            DetailLevel::Detailed => DETAILED_FORMAT,
        };
        log::info!("weather: fetching {:?} forecast for {}", detail, place);
        let res = self
            .client
            .get(&url)
            .query(&[("format", format_param), ("lang", "ru"), ("M", "")])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await;
        let res = match res {
            Ok(r) => r,
            Err(e) => {
                let reason = transport_reason(&e);
                log::warn!("weather: request for {} failed ({}): {}", place, reason, e);
                return WeatherResult::TransientFailure { reason };
            }
        };
        let status = res.status().as_u16();
        let body = match res.text().await {
            Ok(t) => t,
            Err(e) => {
                let reason = transport_reason(&e);
                log::warn!("weather: reading body for {} failed ({}): {}", place, reason, e);
                return WeatherResult::TransientFailure { reason };
            }
        };
        interpret_response(status, &body, place, detail)
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

/// Classify a wttr.in response into a [`WeatherResult`].
///
/// 200 with a real body is a success, decorated with a place-name header for
/// display. 200 with the unknown-location sentinel (or an empty body) and 404
/// both mean the place does not exist. Anything else is transient.
pub fn interpret_response(
    status: u16,
    body: &str,
    place: &str,
    detail: DetailLevel,
) -> WeatherResult {
    match status {
        200 => {
            let text = body.trim();
            if text.is_empty() || text.starts_with(UNKNOWN_LOCATION_SENTINEL) {
                log::warn!("weather: place not found: {}", place);
                WeatherResult::NotFound {
                    place: place.to_string(),
                }
            } else {
                let header = match detail {
                    DetailLevel::Short => "Погода",
                    DetailLevel::Detailed => "Подробная погода",
                };
                WeatherResult::Success {
                    text: format!("🌤 {} в городе {}:\n{}", header, place, text),
                }
            }
        }
        404 => {
            log::warn!("weather: place not found (404): {}", place);
            WeatherResult::NotFound {
                place: place.to_string(),
            }
        }
        code => {
            log::error!("weather: service returned {} for {}", code, place);
            WeatherResult::TransientFailure {
                reason: format!("http_{}", code),
            }
        }
    }
}
