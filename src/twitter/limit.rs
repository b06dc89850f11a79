use crate::twitter::endpoint::Endpoint;
use crate::twitter::{unix_now, wait_until, Params, Transport, TwitterError};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

const RATE_LIMIT_STATUS_URL: &str =
    "https://api.twitter.com/1.1/application/rate_limit_status.json";

pub(crate) const UNAVAILABLE_BACKOFF_SEC: u64 = 30;
pub(crate) const MAX_UNAVAILABLE_RETRIES: u32 = 10;

/// Pre-flight quota check. `ensure_available` returns only once the
/// endpoint's family has at least one request left; best effort, since other
/// consumers of the same credential can race us.
pub struct RateLimitGate {
    transport: Arc<dyn Transport>,
}

impl RateLimitGate {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn ensure_available(&self, endpoint: &dyn Endpoint) -> Result<(), TwitterError> {
        let url = Url::from_str(RATE_LIMIT_STATUS_URL).unwrap();
        let mut unavailable = 0u32;
        loop {
            let response = self.transport.get(&url, &Params::new()).await?;
            if response.status == 503 {
                unavailable += 1;
                if unavailable > MAX_UNAVAILABLE_RETRIES {
                    return Err(TwitterError::Api(503));
                }
                log::warn!("rate_limit_status returned 503, backing off");
                wait_until(unix_now() + UNAVAILABLE_BACKOFF_SEC).await;
                continue;
            }
            unavailable = 0;
            if response.status != 200 {
                return Err(TwitterError::Api(response.status));
            }
            let body: Value = serde_json::from_str(&response.body)?;
            let quota = endpoint.quota(&body)?;
            if quota.remaining == 0 {
                log::info!("request quota exhausted, waiting for reset");
                wait_until(quota.reset_at).await;
                // Quota may have been consumed again while we slept.
                continue;
            }
            return Ok(());
        }
    }
}

/// Rate-limit state reported in a page response's headers. Either header can
/// be absent; the collector treats that as "unknown, assume exhausted".
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageLimit {
    pub remaining: Option<u64>,
    pub reset_at: Option<u64>,
}

impl PageLimit {
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        let field = |name: &str| headers.get(name)?.parse::<u64>().ok();
        Self {
            remaining: field("x-rate-limit-remaining"),
            reset_at: field("x-rate-limit-reset"),
        }
    }
}
