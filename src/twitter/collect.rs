use crate::model::Tweet;
use crate::twitter::endpoint::Endpoint;
use crate::twitter::limit::{
    PageLimit, RateLimitGate, MAX_UNAVAILABLE_RETRIES, UNAVAILABLE_BACKOFF_SEC,
};
use crate::twitter::{unix_now, wait_until, Params, Transport, TwitterError};
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    /// Stop after this many yielded tweets. Zero or negative collects until
    /// the endpoint runs out of pages.
    pub total: i64,
    pub include_retweets: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            total: -1,
            include_retweets: false,
        }
    }
}

/// Pages backward through one endpoint, yielding tweets lazily while
/// honoring both throttling signals: the pre-flight quota check and the
/// per-response rate-limit headers.
pub struct Collector {
    transport: Arc<dyn Transport>,
    endpoint: Arc<dyn Endpoint>,
}

impl Collector {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// One collection run. The stream is finite and non-restartable; tweets
    /// already yielded stay valid if a later page fails.
    pub fn tweets(
        &self,
        options: CollectOptions,
    ) -> impl Stream<Item = Result<Tweet, TwitterError>> {
        let run = Run::new(self.transport.clone(), self.endpoint.clone(), options);
        stream::try_unfold(run, |mut run| async move {
            Ok::<_, TwitterError>(run.next().await?.map(|tweet| (tweet, run)))
        })
    }

    /// Same run, but yields only the tweet text.
    pub fn texts(
        &self,
        options: CollectOptions,
    ) -> impl Stream<Item = Result<String, TwitterError>> {
        self.tweets(options).map_ok(|tweet| tweet.text)
    }
}

/// State for one run: the cursor-bearing params, the yield budget, the 503
/// counter, and the not-yet-yielded remainder of the current page.
struct Run {
    transport: Arc<dyn Transport>,
    endpoint: Arc<dyn Endpoint>,
    gate: RateLimitGate,
    url: Url,
    params: Params,
    options: CollectOptions,
    yielded: i64,
    unavailable: u32,
    pending: VecDeque<Tweet>,
    /// Header-reported limit from the last page, applied just before the
    /// next fetch.
    deferred: Option<PageLimit>,
    gated: bool,
    done: bool,
}

impl Run {
    fn new(transport: Arc<dyn Transport>, endpoint: Arc<dyn Endpoint>, options: CollectOptions) -> Self {
        let gate = RateLimitGate::new(transport.clone());
        let (url, mut params) = endpoint.request();
        // include_rts only means something to statuses/user_timeline; the
        // search endpoint ignores it.
        params.insert("include_rts", options.include_retweets.to_string());
        Self {
            transport,
            endpoint,
            gate,
            url,
            params,
            options,
            yielded: 0,
            unavailable: 0,
            pending: VecDeque::new(),
            deferred: None,
            gated: false,
            done: false,
        }
    }

    async fn next(&mut self) -> Result<Option<Tweet>, TwitterError> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(tweet) = self.pending.pop_front() {
                self.yielded += 1;
                if self.options.total > 0 && self.yielded >= self.options.total {
                    self.done = true;
                }
                return Ok(Some(tweet));
            }
            if !self.gated {
                self.gate.ensure_available(&*self.endpoint).await?;
                self.gated = true;
            } else if let Some(limit) = self.deferred.take() {
                self.recheck(limit).await?;
            }
            let body = self.fetch_page().await?;
            let items = self.endpoint.items(&body)?;
            if items.is_empty() {
                // Natural end of data. `count` is only an upper bound, so a
                // short page proves nothing; only an empty one does.
                self.done = true;
                return Ok(None);
            }
            let mut last_id = 0;
            for tweet in items {
                last_id = tweet.id;
                if self.options.include_retweets || !tweet.is_retweet() {
                    self.pending.push_back(tweet);
                }
            }
            // Cursor comes from the last item iterated, filtered or not, so
            // a trailing retweet still advances the page boundary.
            self.params
                .insert("max_id", last_id.saturating_sub(1).to_string());
            // A page of nothing but filtered retweets leaves `pending` empty
            // and loops straight into the next fetch.
        }
    }

    async fn fetch_page(&mut self) -> Result<Value, TwitterError> {
        loop {
            let response = self.transport.get(&self.url, &self.params).await?;
            if response.status == 503 {
                self.unavailable += 1;
                if self.unavailable > MAX_UNAVAILABLE_RETRIES {
                    return Err(TwitterError::Api(503));
                }
                log::warn!("page fetch returned 503, backing off");
                wait_until(unix_now() + UNAVAILABLE_BACKOFF_SEC).await;
                continue;
            }
            self.unavailable = 0;
            if response.status != 200 {
                return Err(TwitterError::Api(response.status));
            }
            self.deferred = Some(PageLimit::from_headers(&response.headers));
            return Ok(serde_json::from_str(&response.body)?);
        }
    }

    async fn recheck(&self, limit: PageLimit) -> Result<(), TwitterError> {
        match (limit.remaining, limit.reset_at) {
            (Some(0), Some(reset_at)) => {
                wait_until(reset_at).await;
                self.gate.ensure_available(&*self.endpoint).await
            }
            (Some(_), Some(_)) => Ok(()),
            _ => {
                log::warn!("response missing x-rate-limit headers, re-checking quota");
                self.gate.ensure_available(&*self.endpoint).await
            }
        }
    }
}
