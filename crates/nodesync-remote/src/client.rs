//! Repository REST client
//!
//! Wraps `reqwest::Client` with base URL construction, per-request
//! authorization from the session provider, HTTP status classification and
//! automatic retry of 429 responses.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use nodesync_core::ports::{ISessionProvider, RemoteError};

/// Default retry-after duration when header is missing (30 seconds)
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Error body returned by the repository
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    brief_summary: Option<String>,
    error_key: Option<String>,
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds or an HTTP date no more than an hour ahead;
/// anything else yields `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

/// Maps a transport failure to a gateway error
pub(crate) fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::InvalidResponse(e.to_string())
    } else if is_connection_drop(&e) {
        debug!(error = %e, "Connection dropped by peer");
        RemoteError::ConnectionLost
    } else {
        RemoteError::Network(e.to_string())
    }
}

/// Whether the peer closed an established connection before answering
///
/// Refused connections and timeouts are not drops; the server was never
/// reached or never answered.
fn is_connection_drop(e: &reqwest::Error) -> bool {
    if e.is_connect() || e.is_timeout() {
        return false;
    }

    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        // hyper reports a clean close mid-exchange only through its message
        if err.to_string().contains("connection closed before message completed") {
            return true;
        }
        source = err.source();
    }
    false
}

/// HTTP client for the repository REST API
#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    session: Arc<dyn ISessionProvider>,
    max_retries: u32,
}

impl RemoteClient {
    /// Creates a client rooted at `base_url`
    ///
    /// # Arguments
    /// * `base_url` - REST API root, e.g. `https://host/alfresco/api/-default-/public/alfresco/versions/1`
    /// * `session` - Provider asked for authorization headers before every request
    pub fn new(base_url: impl Into<String>, session: Arc<dyn ISessionProvider>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Overrides how many 429 responses are retried before giving up
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Creates an unauthenticated request builder for an API path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    // ========================================================================
    // T060: send - authorization, status mapping and 429 handling
    // ========================================================================

    /// Sends a request built by `build`, retrying on HTTP 429
    ///
    /// `build` is invoked once per attempt so bodies that cannot be cloned
    /// (multipart forms) are rebuilt. Authorization headers are fetched from
    /// the session provider before every attempt.
    ///
    /// # Errors
    /// Non-success statuses map through [`RemoteError::from_status`]; a 429
    /// that persists past the retry limit yields `RemoteError::TooManyRequests`.
    pub async fn send<F>(&self, label: &str, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        for attempt in 0..=self.max_retries {
            let headers = self
                .session
                .authorization()
                .await
                .map_err(|e| RemoteError::Session(e.to_string()))?;

            let mut request = build(&self.http);
            for (name, value) in headers.iter() {
                request = request.header(name, value);
            }

            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                    .unwrap_or(DEFAULT_RETRY_AFTER);

                if attempt >= self.max_retries {
                    warn!(label, attempts = attempt + 1, "429 retry limit exhausted");
                    return Err(RemoteError::TooManyRequests { retry_after });
                }

                info!(
                    label,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error.brief_summary.or(e.error.error_key))
                    .unwrap_or(body);
                debug!(label, status = status.as_u16(), %message, "Request failed");
                return Err(RemoteError::from_status(status.as_u16(), message));
            }

            if attempt > 0 {
                info!(label, attempt, "Request succeeded after retry");
            }
            return Ok(response);
        }

        Err(RemoteError::TooManyRequests {
            retry_after: DEFAULT_RETRY_AFTER,
        })
    }

    /// GETs an API path and decodes the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let response = self
            .send(path, |http| http.get(&url).query(query))
            .await?;
        response.json::<T>().await.map_err(transport_error)
    }

    /// POSTs a JSON body to an API path, discarding the response body
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<StatusCode, RemoteError> {
        let url = self.url(path);
        let response = self
            .send(path, |http| http.post(&url).json(body))
            .await?;
        Ok(response.status())
    }
}
