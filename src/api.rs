use crate::config::AppConfig;
use crate::error::{ApiError, UNKNOWN_ERROR_DETAIL};
use crate::models::{ChatMode, ChatReply, ChatRequest, StatsPayload, StatsSnapshot, TimeWindow};
use crate::utils::find_char_boundary;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const STATS_SERVICE: &str = "Stats API";
const CHAT_SERVICE: &str = "Chat API";

// ── Remote seams ────────────────────────────────────────────────────────

/// Source of aggregated statistics for a time window.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_stats(&self, window: TimeWindow) -> Result<StatsSnapshot, ApiError>;
}

/// Remote assistant answering one chat turn at a time.
///
/// The caller trims and validates `message`; implementations send it as is.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat_turn(
        &self,
        message: &str,
        mode: ChatMode,
        session_id: &str,
    ) -> Result<ChatReply, ApiError>;
}

// ── HTTP client ─────────────────────────────────────────────────────────

/// HTTP client for the statistics/chat service.
///
/// Every request carries `Cache-Control: no-cache` so each call reflects the
/// current server state. There are no retries here; recovery is user-driven.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        Self::with_timeouts(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    pub fn with_timeouts(
        base_url: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(format!("tea-dashboard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::unexpected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability probe against `GET /health`. The body is ignored.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "health probe failed");
                false
            }
        }
    }

    fn classify(&self, service: &'static str, err: reqwest::Error) -> ApiError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ApiError::Network {
                service,
                base_url: self.base_url.clone(),
                reason: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            ApiError::unexpected(format!("failed to read {service} response: {err}"))
        } else {
            ApiError::unexpected(err.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();

        if !status.is_success() {
            let detail = match resp.text().await {
                Ok(body) => extract_detail(&body),
                Err(_) => UNKNOWN_ERROR_DETAIL.to_string(),
            };
            warn!(service, status = status.as_u16(), %detail, "request rejected");
            return Err(ApiError::Http {
                service,
                status: status.as_u16(),
                detail,
            });
        }

        let body = resp.text().await.map_err(|e| self.classify(service, e))?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::unexpected(format!(
                "failed to parse {} response: {}. Raw body: {}",
                service,
                e,
                &body[..find_char_boundary(&body, 200)]
            ))
        })
    }
}

#[async_trait]
impl StatsSource for ApiClient {
    async fn fetch_stats(&self, window: TimeWindow) -> Result<StatsSnapshot, ApiError> {
        let url = format!("{}/api/v1/stats?period={}", self.base_url, window);
        debug!(%url, "fetching statistics");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(STATS_SERVICE, e))?;

        let payload: StatsPayload = self.read_json(STATS_SERVICE, resp).await?;
        payload
            .into_snapshot(window)
            .map_err(|breach| {
                ApiError::unexpected(format!("invalid statistics payload: {breach}"))
            })
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_chat_turn(
        &self,
        message: &str,
        mode: ChatMode,
        session_id: &str,
    ) -> Result<ChatReply, ApiError> {
        let url = format!("{}/api/v1/chat/message", self.base_url);
        debug!(%mode, session_id, message_len = message.len(), "sending chat turn");

        let body = ChatRequest {
            message,
            mode,
            session_id,
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(CHAT_SERVICE, e))?;

        self.read_json(CHAT_SERVICE, resp).await
    }
}

/// Pull `detail` out of a `{detail: ...}` error body.
///
/// Non-string details (validation error lists) are kept as their JSON text.
fn extract_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        detail: serde_json::Value,
    }

    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) => return UNKNOWN_ERROR_DETAIL.to_string(),
    };
    match detail {
        serde_json::Value::String(s) if !s.trim().is_empty() => s,
        serde_json::Value::String(_) | serde_json::Value::Null => {
            UNKNOWN_ERROR_DETAIL.to_string()
        }
        other => other.to_string(),
    }
}
