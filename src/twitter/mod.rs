pub mod collect;
pub mod endpoint;
pub mod limit;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

const TIMEOUT_SEC: u64 = 10;

/// Slack added on top of every reset/backoff wait.
const WAIT_SAFETY_MARGIN_SEC: u64 = 10;

#[derive(Deserialize)]
pub struct Authentication {
    pub bearer_token: String,
}

#[derive(Debug, Error)]
pub enum TwitterError {
    /// Non-retryable API status, or a 503 that outlived its retry budget.
    #[error("Twitter API error {0}")]
    Api(u16),
    #[error("Error performing HTTP request: {0}")]
    Request(
        #[source]
        #[from]
        reqwest::Error,
    ),
    #[error("Invalid response body: {0}")]
    Json(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(&'static str),
    #[error("Bearer token is not a valid header value")]
    InvalidToken,
}

/// Query parameters for one request. Built from `maplit::hashmap!` literals
/// and mutated in place as the pagination cursor advances.
pub type Params = HashMap<&'static str, String>;

/// A raw API response. Header names are lowercased so lookups don't have to
/// care how the server spelled them.
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// An opaque authenticated-GET capability. The retrieval loop only ever sees
/// this, never the credentials; tests substitute a scripted fake.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, params: &Params) -> Result<ApiResponse, TwitterError>;
}

#[derive(Clone)]
pub struct BearerTransport {
    client: Client,
}

impl BearerTransport {
    pub fn new(auth: &Authentication) -> Result<Self, TwitterError> {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", auth.bearer_token);
        let value = HeaderValue::from_str(&value).map_err(|_| TwitterError::InvalidToken)?;
        headers.insert(AUTHORIZATION, value);
        Ok(Self {
            client: Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_secs(TIMEOUT_SEC))
                .build()?,
        })
    }
}

#[async_trait]
impl Transport for BearerTransport {
    async fn get(&self, url: &Url, params: &Params) -> Result<ApiResponse, TwitterError> {
        let response = self.client.get(url.clone()).query(params).send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response.text().await?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sleep until `reset_at` (epoch seconds), plus the safety margin. Shared by
/// the 503 backoff and the quota-reset waits.
pub(crate) async fn wait_until(reset_at: u64) {
    let seconds = reset_at.saturating_sub(unix_now()) + WAIT_SAFETY_MARGIN_SEC;
    log::info!("waiting {} sec for the rate limit window", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One request the fake saw: url path plus the query params it was given.
    pub struct SeenRequest {
        pub path: String,
        pub params: Params,
    }

    /// Scripted transport: pops one canned response per `get`, records every
    /// request so tests can assert on cursor movement and quota checks.
    pub struct FakeTransport {
        responses: Mutex<VecDeque<ApiResponse>>,
        pub seen: Mutex<Vec<SeenRequest>>,
    }

    impl FakeTransport {
        pub fn new(responses: Vec<ApiResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn requests_to(&self, path: &str) -> usize {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.path == path)
                .count()
        }

        pub fn max_ids(&self) -> Vec<u64> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| r.params.get("max_id"))
                .map(|v| v.parse().unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, url: &Url, params: &Params) -> Result<ApiResponse, TwitterError> {
            self.seen.lock().unwrap().push(SeenRequest {
                path: url.path().to_string(),
                params: params.clone(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TwitterError::UnexpectedShape("fake transport exhausted"))
        }
    }

    pub fn ok(body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            headers: HashMap::new(),
            body: body.to_string(),
        }
    }

    pub fn ok_with_limit(body: serde_json::Value, remaining: u64, reset: u64) -> ApiResponse {
        let mut response = ok(body);
        response
            .headers
            .insert("x-rate-limit-remaining".to_string(), remaining.to_string());
        response
            .headers
            .insert("x-rate-limit-reset".to_string(), reset.to_string());
        response
    }

    pub fn status(status: u16) -> ApiResponse {
        ApiResponse {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// A rate_limit_status body with plenty of quota for both endpoints.
    pub fn quota_ok() -> ApiResponse {
        ok(serde_json::json!({
            "resources": {
                "search": {"/search/tweets": {"remaining": 180, "reset": 0}},
                "statuses": {"/statuses/user_timeline": {"remaining": 900, "reset": 0}}
            }
        }))
    }
}
