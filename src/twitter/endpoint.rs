use crate::model::Tweet;
use crate::twitter::{Params, TwitterError};
use maplit::hashmap;
use serde_json::Value;
use std::str::FromStr;
use url::Url;

const SEARCH_URL: &str = "https://api.twitter.com/1.1/search/tweets.json";
const USER_TIMELINE_URL: &str = "https://api.twitter.com/1.1/statuses/user_timeline.json";

// Fixed page sizes; the API treats `count` as an upper bound.
const SEARCH_PAGE_SIZE: u32 = 100;
const USER_TIMELINE_PAGE_SIZE: u32 = 200;

/// Quota state for one endpoint family, fetched fresh on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining: u64,
    pub reset_at: u64,
}

impl QuotaStatus {
    /// Read `remaining`/`reset` out of a rate_limit_status body at
    /// `resources.<family>.<path>`. The API serves the numbers as ints or as
    /// int-strings depending on the day, so accept both.
    fn at_path(status: &Value, family: &str, path: &str) -> Result<Self, TwitterError> {
        let bucket = status
            .get("resources")
            .and_then(|r| r.get(family))
            .and_then(|f| f.get(path))
            .ok_or(TwitterError::UnexpectedShape(
                "rate_limit_status missing endpoint bucket",
            ))?;
        let field = |key: &str| {
            let value = bucket.get(key)?;
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        };
        match (field("remaining"), field("reset")) {
            (Some(remaining), Some(reset_at)) => Ok(Self {
                remaining,
                reset_at,
            }),
            _ => Err(TwitterError::UnexpectedShape(
                "rate_limit_status bucket missing remaining/reset",
            )),
        }
    }
}

/// One retrieval mode: supplies the request shape, pulls tweets out of a page
/// body, and knows where its quota bucket lives in the rate_limit_status
/// tree. Stateless beyond its construction parameter.
pub trait Endpoint: Send + Sync {
    fn request(&self) -> (Url, Params);

    fn items(&self, body: &Value) -> Result<Vec<Tweet>, TwitterError>;

    fn quota(&self, status: &Value) -> Result<QuotaStatus, TwitterError>;
}

/// Keyword search against `search/tweets`.
pub struct Search {
    keyword: String,
}

impl Search {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }
}

impl Endpoint for Search {
    fn request(&self) -> (Url, Params) {
        let url = Url::from_str(SEARCH_URL).unwrap();
        let params = hashmap! {
            "q" => self.keyword.clone(),
            "count" => SEARCH_PAGE_SIZE.to_string(),
        };
        (url, params)
    }

    fn items(&self, body: &Value) -> Result<Vec<Tweet>, TwitterError> {
        let statuses = body
            .get("statuses")
            .ok_or(TwitterError::UnexpectedShape("search body missing statuses"))?;
        Ok(serde_json::from_value(statuses.clone())?)
    }

    fn quota(&self, status: &Value) -> Result<QuotaStatus, TwitterError> {
        QuotaStatus::at_path(status, "search", "/search/tweets")
    }
}

/// A single user's timeline via `statuses/user_timeline`.
pub struct UserTimeline {
    screen_name: String,
}

impl UserTimeline {
    pub fn new(screen_name: impl Into<String>) -> Self {
        Self {
            screen_name: screen_name.into(),
        }
    }
}

impl Endpoint for UserTimeline {
    fn request(&self) -> (Url, Params) {
        let url = Url::from_str(USER_TIMELINE_URL).unwrap();
        let params = hashmap! {
            "screen_name" => self.screen_name.clone(),
            "count" => USER_TIMELINE_PAGE_SIZE.to_string(),
        };
        (url, params)
    }

    fn items(&self, body: &Value) -> Result<Vec<Tweet>, TwitterError> {
        if !body.is_array() {
            return Err(TwitterError::UnexpectedShape(
                "user_timeline body is not an array",
            ));
        }
        Ok(serde_json::from_value(body.clone())?)
    }

    fn quota(&self, status: &Value) -> Result<QuotaStatus, TwitterError> {
        QuotaStatus::at_path(status, "statuses", "/statuses/user_timeline")
    }
}
