//! Resilient client for the Twitter REST API.
//!
//! Every call goes through [`ApiClient::request`]:
//!
//! 1. GET responses are served from the TTL cache when fresh.
//! 2. If the endpoint's quota is exhausted, sleep (capped) before sending.
//! 3. Send, feed the response headers to the [`RateLimitManager`], then:
//!
//! | Outcome                | Action                                          |
//! |------------------------|-------------------------------------------------|
//! | 2xx, valid JSON        | cache (GET only) and return                     |
//! | 2xx, `status: error`   | return [`ApiError::Upstream`], not cached       |
//! | 2xx, invalid JSON      | [`ApiError::Decode`], never retried             |
//! | 429                    | sleep `Retry-After` (capped) and retry          |
//! | other 4xx              | terminal error on the first attempt             |
//! | 5xx / transport error  | exponential backoff with jitter, then retry     |
//!
//! Running out of attempts on 5xx or transport errors returns that error;
//! running out while throttled returns [`ApiError::MaxRetriesExceeded`].
//!
//! All waiting is blocking `thread::sleep` on the calling thread.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::config::{secs, ClientConfig};
use crate::error::ApiError;
use crate::models::CanonicalTweet;
use crate::rate_limit::{BackoffPolicy, RateLimitManager, RateLimitStats, HEADER_RETRY_AFTER};
use crate::transform::DataTransformer;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, UreqTransport};

pub const API_KEY_HEADER: &str = "X-API-Key";

pub const USER_INFO: &str = "/twitter/user/info";
pub const USER_BATCH_INFO: &str = "/twitter/user/batch_info_by_ids";
pub const ADVANCED_SEARCH: &str = "/twitter/tweet/advanced_search";
pub const USER_LAST_TWEETS: &str = "/twitter/user/last_tweets";
pub const USER_FOLLOWERS: &str = "/twitter/user/followers";
pub const USER_FOLLOWINGS: &str = "/twitter/user/followings";
pub const TWEETS_BY_IDS: &str = "/twitter/tweets";
pub const TWEET_REPLIES: &str = "/twitter/tweet/replies";

// ─────────────────────────────────────────────────────────────────────────────
// Call options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryType {
    #[default]
    Latest,
    Top,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Latest => "Latest",
            QueryType::Top => "Top",
        }
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latest" => Ok(QueryType::Latest),
            "top" => Ok(QueryType::Top),
            other => Err(format!("unknown query type '{other}' (expected latest or top)")),
        }
    }
}

/// A user addressed by screen name or by numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Name(String),
    Id(String),
}

impl UserRef {
    fn param(&self) -> (String, String) {
        match self {
            UserRef::Name(name) => ("userName".to_string(), clean_username(name)),
            UserRef::Id(id) => ("userId".to_string(), id.clone()),
        }
    }
}

/// Stop conditions for the `get_all_*` aggregators. The first limit reached
/// wins; a page without a next cursor always ends the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub max_pages: Option<usize>,
    pub max_items: Option<usize>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { max_pages: Some(10), max_items: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    /// Total time budget; `None` means no time limit.
    pub max_time: Option<Duration>,
    pub max_polls: Option<usize>,
    pub query_type: QueryType,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_time: Some(Duration::from_secs(3600)),
            max_polls: None,
            query_type: QueryType::Latest,
        }
    }
}

fn clean_username(name: &str) -> String {
    name.trim().trim_start_matches('@').to_string()
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn push_cursor(params: &mut Vec<(String, String)>, cursor: Option<&str>) {
    if let Some(c) = cursor.filter(|c| !c.is_empty()) {
        params.push(("cursor".to_string(), c.to_string()));
    }
}

/// Server-requested delay, capped at `max` before it becomes a `Duration`.
fn retry_after(response: &HttpResponse, max: Duration) -> Option<Duration> {
    let raw = response.headers.get(HEADER_RETRY_AFTER)?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    Some(secs(seconds.min(max.as_secs_f64())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Page helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Items of one page under the first matching key. The container may be a
/// bare list or `{"results": [...]}`.
fn page_items(page: &Value, keys: &[&str]) -> Vec<Value> {
    if let Value::Array(items) = page {
        return items.clone();
    }
    for key in keys {
        match page.get(*key) {
            Some(Value::Array(items)) => return items.clone(),
            Some(Value::Object(inner)) => {
                if let Some(Value::Array(items)) = inner.get("results") {
                    return items.clone();
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Cursor for the following page, present only when the page says there is one.
fn next_cursor(page: &Value) -> Option<String> {
    if page.get("has_next_page").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    page.get("next_cursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiClient
// ─────────────────────────────────────────────────────────────────────────────

pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Option<ResponseCache>,
    rate_limits: RateLimitManager,
    transformer: DataTransformer,
}

impl ApiClient {
    /// Client over HTTPS with the configured timeouts.
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.connect_timeout(), config.read_timeout());
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let policy = BackoffPolicy {
            base_delay: config.base_retry_delay_seconds,
            max_delay: config.max_retry_delay_seconds,
            ..BackoffPolicy::default()
        };
        let cache = ResponseCache::new(config.cache_size, config.cache_ttl());
        info!(
            base_url = %config.base_url,
            cache_size = config.cache_size,
            max_retries = config.max_retries,
            "api client ready"
        );
        Self {
            config,
            transport,
            cache,
            rate_limits: RateLimitManager::new(policy),
            transformer: DataTransformer::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transformer(&self) -> &DataTransformer {
        &self.transformer
    }

    pub fn rate_limits(&self) -> &RateLimitManager {
        &self.rate_limits
    }

    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.rate_limits.get_stats()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("response cache cleared");
        }
    }

    /// Drop cached responses whose key contains `pattern`.
    pub fn clear_cache_by_pattern(&self, pattern: &str) -> usize {
        let removed = self.cache.as_ref().map_or(0, |c| c.clear_by_pattern(pattern));
        debug!(pattern, removed, "cache entries cleared");
        removed
    }

    fn url(&self, endpoint: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    // ── Request core ──────────────────────────────────────────────────────

    /// Perform one API call with caching, rate limiting and retries.
    ///
    /// `retry_count` is the total number of attempts (at least one).
    /// `cache_key` overrides the key derived from method, endpoint and
    /// sorted parameters.
    pub fn request(
        &self,
        method: &str,
        endpoint: &str,
        params: &[(String, String)],
        retry_count: u32,
        cache_key: Option<&str>,
    ) -> Result<Value, ApiError> {
        self.execute(method, endpoint, params, retry_count, cache_key, true)
    }

    fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, ApiError> {
        self.execute("GET", endpoint, params, self.config.max_retries, None, true)
    }

    fn execute(
        &self,
        method: &str,
        endpoint: &str,
        params: &[(String, String)],
        retry_count: u32,
        cache_key: Option<&str>,
        use_cache: bool,
    ) -> Result<Value, ApiError> {
        let method = method.to_ascii_uppercase();
        let cache = self.cache.as_ref().filter(|_| use_cache && method == "GET");
        let key = cache_key.map_or_else(|| ResponseCache::key(&method, endpoint, params), str::to_string);
        if let Some(hit) = cache.and_then(|c| c.get(&key)) {
            return Ok(hit);
        }

        if let Some(wait) = self.rate_limits.should_wait(endpoint) {
            thread::sleep(wait);
        }

        let request = HttpRequest {
            method,
            url: self.url(endpoint),
            headers: vec![
                (API_KEY_HEADER.to_string(), self.config.api_key.clone()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            query: params.to_vec(),
        };

        let attempts = retry_count.max(1);
        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;
            debug!(endpoint, attempt, "sending request");

            let response = match self.transport.send(&request) {
                Ok(r) => r,
                Err(e) => {
                    if last {
                        error!(endpoint, attempt, error = %e, "request failed");
                        return Err(ApiError::Connection(e.to_string()));
                    }
                    let delay = self.rate_limits.calculate_backoff(attempt, None);
                    warn!(endpoint, attempt, error = %e, delay_ms = delay.as_millis() as u64, "transport error, retrying");
                    thread::sleep(delay);
                    continue;
                }
            };

            self.rate_limits.update(endpoint, &response.headers);

            match response.status {
                200..=299 => return self.accept(endpoint, cache.map(|c| (c, key)), &response.body),
                429 => {
                    let delay = retry_after(&response, self.config.max_retry_delay())
                        .unwrap_or_else(|| self.rate_limits.calculate_backoff(attempt, Some(429)));
                    warn!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "rate limited");
                    if !last {
                        thread::sleep(delay);
                    }
                }
                status @ 400..=499 => {
                    warn!(endpoint, status, "client error");
                    return Err(ApiError::from_status(status));
                }
                status @ 500..=599 => {
                    if last {
                        error!(endpoint, status, attempt, "server error, giving up");
                        return Err(ApiError::from_status(status));
                    }
                    let delay = self.rate_limits.calculate_backoff(attempt, Some(status));
                    warn!(endpoint, status, attempt, delay_ms = delay.as_millis() as u64, "server error, retrying");
                    thread::sleep(delay);
                }
                status => {
                    warn!(endpoint, status, "unexpected status");
                    return Err(ApiError::from_status(status));
                }
            }
        }

        error!(endpoint, attempts, "max retries exceeded");
        Err(ApiError::MaxRetriesExceeded)
    }

    fn accept(
        &self,
        endpoint: &str,
        cache: Option<(&ResponseCache, String)>,
        body: &str,
    ) -> Result<Value, ApiError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            error!(endpoint, error = %e, "invalid JSON response");
            ApiError::Decode(e.to_string())
        })?;

        if value.get("status").and_then(Value::as_str) == Some("error") {
            let msg = value
                .get("msg")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            warn!(endpoint, msg = %msg, "upstream reported an error");
            return Err(ApiError::Upstream { msg, payload: value });
        }

        if let Some((cache, key)) = cache {
            cache.insert(key, endpoint, value.clone());
        }
        Ok(value)
    }

    // ── Endpoints ─────────────────────────────────────────────────────────

    pub fn get_user_info(&self, username: &str) -> Result<Value, ApiError> {
        let name = clean_username(username);
        self.get(USER_INFO, &params(&[("userName", &name)]))
    }

    pub fn get_users_by_ids(&self, user_ids: &[String]) -> Result<Value, ApiError> {
        let ids = user_ids.join(",");
        self.get(USER_BATCH_INFO, &params(&[("userIds", &ids)]))
    }

    pub fn search_tweets(
        &self,
        query: &str,
        query_type: QueryType,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut p = params(&[("query", query), ("queryType", query_type.as_str())]);
        push_cursor(&mut p, cursor);
        self.get(ADVANCED_SEARCH, &p)
    }

    pub fn get_user_tweets(
        &self,
        user: &UserRef,
        include_replies: bool,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut p = vec![user.param()];
        p.push(("includeReplies".to_string(), include_replies.to_string()));
        push_cursor(&mut p, cursor);
        self.get(USER_LAST_TWEETS, &p)
    }

    pub fn get_user_followers(&self, username: &str, cursor: Option<&str>) -> Result<Value, ApiError> {
        let mut p = params(&[("userName", &clean_username(username))]);
        push_cursor(&mut p, cursor);
        self.get(USER_FOLLOWERS, &p)
    }

    pub fn get_user_followings(&self, username: &str, cursor: Option<&str>) -> Result<Value, ApiError> {
        let mut p = params(&[("userName", &clean_username(username))]);
        push_cursor(&mut p, cursor);
        self.get(USER_FOLLOWINGS, &p)
    }

    pub fn get_tweets_by_ids(&self, tweet_ids: &[String]) -> Result<Value, ApiError> {
        let ids = tweet_ids.join(",");
        self.get(TWEETS_BY_IDS, &params(&[("tweet_ids", &ids)]))
    }

    pub fn get_tweet_replies(&self, tweet_id: &str, cursor: Option<&str>) -> Result<Value, ApiError> {
        let mut p = params(&[("tweetId", tweet_id)]);
        push_cursor(&mut p, cursor);
        self.get(TWEET_REPLIES, &p)
    }

    // ── Pagination ────────────────────────────────────────────────────────

    /// Follow `next_cursor` until a limit is reached or the pages run out.
    ///
    /// An error on the first page is returned; a later error ends the walk
    /// and keeps what was collected so far.
    fn paginate<F>(&self, what: &str, keys: &[&str], limits: &Pagination, mut fetch: F) -> Result<Vec<Value>, ApiError>
    where
        F: FnMut(Option<&str>) -> Result<Value, ApiError>,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if matches!(limits.max_pages, Some(max) if pages >= max) {
                break;
            }
            let page = match fetch(cursor.as_deref()) {
                Ok(page) => page,
                Err(e) if pages == 0 => return Err(e),
                Err(e) => {
                    warn!(what, pages, error = %e, "pagination stopped early");
                    break;
                }
            };
            pages += 1;

            let batch = page_items(&page, keys);
            let fetched = batch.len();
            items.extend(batch);
            if let Some(max) = limits.max_items {
                if items.len() >= max {
                    items.truncate(max);
                    break;
                }
            }
            match next_cursor(&page) {
                Some(next) if fetched > 0 => cursor = Some(next),
                _ => break,
            }
        }

        info!(what, pages, items = items.len(), "pagination finished");
        Ok(items)
    }

    pub fn get_all_user_tweets(
        &self,
        user: &UserRef,
        include_replies: bool,
        limits: &Pagination,
    ) -> Result<Vec<Value>, ApiError> {
        self.paginate("user_tweets", &["tweets"], limits, |cursor| {
            self.get_user_tweets(user, include_replies, cursor)
        })
    }

    pub fn get_all_search_tweets(
        &self,
        query: &str,
        query_type: QueryType,
        limits: &Pagination,
    ) -> Result<Vec<Value>, ApiError> {
        self.paginate("search", &["tweets"], limits, |cursor| {
            self.search_tweets(query, query_type, cursor)
        })
    }

    pub fn get_all_followers(&self, username: &str, limits: &Pagination) -> Result<Vec<Value>, ApiError> {
        self.paginate("followers", &["followers", "users"], limits, |cursor| {
            self.get_user_followers(username, cursor)
        })
    }

    pub fn get_all_tweet_replies(&self, tweet_id: &str, limits: &Pagination) -> Result<Vec<Value>, ApiError> {
        self.paginate("replies", &["replies", "tweets"], limits, |cursor| {
            self.get_tweet_replies(tweet_id, cursor)
        })
    }

    // ── Polling ───────────────────────────────────────────────────────────

    /// Poll the search endpoint and hand each tweet not seen before to
    /// `on_tweet`. Polls bypass the response cache. Failed polls are logged
    /// and skipped. Returns the number of tweets delivered.
    pub fn stream_tweets_by_query<F>(&self, query: &str, opts: &PollOptions, mut on_tweet: F) -> usize
    where
        F: FnMut(&CanonicalTweet),
    {
        let started = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        let mut polls = 0usize;
        let mut delivered = 0usize;

        loop {
            let query_params = params(&[("query", query), ("queryType", opts.query_type.as_str())]);
            match self.execute("GET", ADVANCED_SEARCH, &query_params, self.config.max_retries, None, false) {
                Ok(page) => {
                    for tweet in self.transformer.transform_tweets_batch(&page) {
                        if seen.insert(tweet.tweet_id.clone()) {
                            on_tweet(&tweet);
                            delivered += 1;
                        }
                    }
                }
                Err(e) => warn!(query, error = %e, "poll failed"),
            }
            polls += 1;

            if matches!(opts.max_polls, Some(max) if polls >= max) {
                break;
            }
            let pause = match opts.max_time {
                Some(budget) => {
                    let elapsed = started.elapsed();
                    if elapsed >= budget {
                        break;
                    }
                    opts.interval.min(budget - elapsed)
                }
                None => opts.interval,
            };
            thread::sleep(pause);
            if matches!(opts.max_time, Some(budget) if started.elapsed() >= budget) {
                break;
            }
        }

        info!(query, polls, delivered, "polling finished");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::HEADER_REMAINING;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        fn scripted(steps: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(steps.into()), sent: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> HttpRequest {
            self.sent.lock().unwrap()[i].clone()
        }
    }

    impl HttpTransport for MockTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn reply(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse { status, headers: HashMap::new(), body: body.to_string() })
    }

    fn reply_with(status: u16, headers: &[(&str, &str)], body: Value) -> Result<HttpResponse, TransportError> {
        let headers = headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Ok(HttpResponse { status, headers, body: body.to_string() })
    }

    fn client(mock: &Arc<MockTransport>) -> ApiClient {
        let config = ClientConfig {
            api_key: "secret".into(),
            base_url: "http://mock.local/".into(),
            base_retry_delay_seconds: 0.001,
            max_retry_delay_seconds: 0.005,
            ..ClientConfig::default()
        };
        ApiClient::with_transport(config, Arc::clone(mock) as Arc<dyn HttpTransport>)
    }

    fn query_value(req: &HttpRequest, key: &str) -> Option<String> {
        req.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_request_shape_and_auth_header() {
        let mock = MockTransport::scripted(vec![reply(200, json!({"data": {"id": "1"}}))]);
        let c = client(&mock);
        c.get_user_info("@ali").unwrap();

        let req = mock.request(0);
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "http://mock.local/twitter/user/info");
        assert!(req.headers.contains(&(API_KEY_HEADER.to_string(), "secret".to_string())));
        assert_eq!(query_value(&req, "userName").as_deref(), Some("ali"));
    }

    #[test]
    fn test_get_is_cached() {
        let mock = MockTransport::scripted(vec![reply(200, json!({"n": 1})), reply(200, json!({"n": 2}))]);
        let c = client(&mock);
        let a = c.get_user_info("ali").unwrap();
        let b = c.get_user_info("ali").unwrap();
        assert_eq!(a, b);
        assert_eq!(mock.calls(), 1);

        assert_eq!(c.clear_cache_by_pattern("user/info"), 1);
        assert_eq!(c.get_user_info("ali").unwrap()["n"], 2);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        for (status, expected) in [
            (400, ApiError::BadRequest),
            (401, ApiError::Unauthorized),
            (404, ApiError::NotFound),
        ] {
            let mock = MockTransport::scripted(vec![reply(status, json!({}))]);
            let got = client(&mock).get_user_info("x").unwrap_err();
            assert_eq!(got, expected);
            assert_eq!(mock.calls(), 1, "status {} got: {} calls", status, mock.calls());
        }
    }

    #[test]
    fn test_server_errors_exhaust_retries() {
        let mock = MockTransport::scripted(vec![
            reply(500, json!({})),
            reply(503, json!({})),
            reply(500, json!({})),
        ]);
        let got = client(&mock).get_user_info("x").unwrap_err();
        assert_eq!(got, ApiError::Server { status: 500 });
        assert_eq!(mock.calls(), 3);
        assert_eq!(got.to_value(), json!({"status": "error", "msg": "Server error (HTTP 500)"}));
    }

    #[test]
    fn test_server_error_then_success() {
        let mock = MockTransport::scripted(vec![
            reply(503, json!({})),
            reply(503, json!({})),
            reply(200, json!({"ok": true})),
        ]);
        let got = client(&mock).get_user_info("x").unwrap();
        assert_eq!(got["ok"], true);
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn test_transport_errors() {
        let mock = MockTransport::scripted(vec![
            Err(TransportError::Timeout("slow".into())),
            reply(200, json!({"ok": true})),
        ]);
        assert!(client(&mock).get_user_info("x").is_ok());

        let mock = MockTransport::scripted(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
        ]);
        let got = client(&mock).get_user_info("x").unwrap_err();
        assert!(matches!(got, ApiError::Connection(_)), "got: {:?}", got);
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn test_rate_limited_then_success() {
        let mock = MockTransport::scripted(vec![
            reply_with(429, &[(HEADER_RETRY_AFTER, "0")], json!({})),
            reply(200, json!({"ok": true})),
        ]);
        assert!(client(&mock).get_user_info("x").is_ok());
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        let mock = MockTransport::scripted(vec![
            reply_with(429, &[(HEADER_RETRY_AFTER, "1e30")], json!({})),
            reply(200, json!({"ok": true})),
        ]);
        let started = Instant::now();
        assert!(client(&mock).get_user_info("x").is_ok());
        assert!(started.elapsed() < Duration::from_secs(1), "slept {:?}", started.elapsed());

        let response = HttpResponse {
            status: 429,
            headers: [(HEADER_RETRY_AFTER.to_string(), "inf".to_string())].into_iter().collect(),
            body: String::new(),
        };
        assert_eq!(retry_after(&response, Duration::from_secs(60)), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_unexpected_status_is_terminal() {
        for status in [101, 304] {
            let mock = MockTransport::scripted(vec![reply(status, json!({}))]);
            let got = client(&mock).get_user_info("x").unwrap_err();
            assert_eq!(got, ApiError::Client { status });
            assert_eq!(mock.calls(), 1, "status {} got: {} calls", status, mock.calls());
        }
    }

    #[test]
    fn test_rate_limited_until_exhausted() {
        let mock = MockTransport::scripted(vec![
            reply(429, json!({})),
            reply(429, json!({})),
            reply(429, json!({})),
        ]);
        let got = client(&mock).get_user_info("x").unwrap_err();
        assert_eq!(got, ApiError::MaxRetriesExceeded);
        assert_eq!(got.to_value()["msg"], "Max retries exceeded");
    }

    #[test]
    fn test_decode_error_is_terminal() {
        let mock = MockTransport::scripted(vec![Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: "<html>".into(),
        })]);
        let got = client(&mock).get_user_info("x").unwrap_err();
        assert!(matches!(got, ApiError::Decode(_)), "got: {:?}", got);
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_upstream_error_payload_not_cached() {
        let payload = json!({"status": "error", "msg": "user suspended"});
        let mock = MockTransport::scripted(vec![reply(200, payload.clone()), reply(200, payload.clone())]);
        let c = client(&mock);
        let got = c.get_user_info("x").unwrap_err();
        assert_eq!(got.message(), "user suspended");
        assert_eq!(got.to_value(), payload);
        assert!(c.get_user_info("x").is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_headers_feed_rate_limits() {
        let mock = MockTransport::scripted(vec![reply_with(200, &[(HEADER_REMAINING, "7")], json!({}))]);
        let c = client(&mock);
        c.get_user_info("x").unwrap();
        let state = c.rate_limits().state(USER_INFO).unwrap();
        assert_eq!(state.remaining, 7);
    }

    #[test]
    fn test_explicit_retry_count_and_cache_key() {
        let mock = MockTransport::scripted(vec![reply(500, json!({})), reply(200, json!({"v": 1}))]);
        let c = client(&mock);
        assert!(c.request("GET", "/custom", &[], 1, Some("k")).is_err());
        assert_eq!(mock.calls(), 1);
        assert_eq!(c.request("get", "/custom", &[], 1, Some("k")).unwrap()["v"], 1);
        assert_eq!(c.request("GET", "/other", &[], 1, Some("k")).unwrap()["v"], 1);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_pagination_follows_cursor() {
        let mock = MockTransport::scripted(vec![
            reply(200, json!({"tweets": [{"id": "1"}, {"id": "2"}], "has_next_page": true, "next_cursor": "c1"})),
            reply(200, json!({"tweets": {"results": [{"id": "3"}]}, "has_next_page": true, "next_cursor": "c2"})),
            reply(200, json!({"tweets": [{"id": "4"}], "has_next_page": false, "next_cursor": ""})),
        ]);
        let c = client(&mock);
        let all = c
            .get_all_user_tweets(&UserRef::Name("ali".into()), false, &Pagination::default())
            .unwrap();
        let ids: Vec<&str> = all.iter().filter_map(|t| t["id"].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(query_value(&mock.request(0), "cursor"), None);
        assert_eq!(query_value(&mock.request(1), "cursor").as_deref(), Some("c1"));
        assert_eq!(query_value(&mock.request(2), "cursor").as_deref(), Some("c2"));
        assert_eq!(query_value(&mock.request(0), "includeReplies").as_deref(), Some("false"));
    }

    #[test]
    fn test_pagination_limits() {
        let page = |id: &str, cursor: &str| {
            reply(200, json!({"tweets": [{"id": id}, {"id": "x"}], "has_next_page": true, "next_cursor": cursor}))
        };
        let mock = MockTransport::scripted(vec![page("1", "a"), page("2", "b"), page("3", "c")]);
        let limits = Pagination { max_pages: Some(2), max_items: None };
        let all = client(&mock).get_all_search_tweets("q", QueryType::Top, &limits).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(mock.calls(), 2);

        let mock = MockTransport::scripted(vec![page("1", "a"), page("2", "b")]);
        let limits = Pagination { max_pages: None, max_items: Some(3) };
        let all = client(&mock).get_all_search_tweets("q", QueryType::Latest, &limits).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_pagination_errors() {
        let mock = MockTransport::scripted(vec![reply(404, json!({}))]);
        let got = client(&mock).get_all_followers("ali", &Pagination::default());
        assert_eq!(got.unwrap_err(), ApiError::NotFound);

        let mock = MockTransport::scripted(vec![
            reply(200, json!({"followers": [{"id": "1"}], "has_next_page": true, "next_cursor": "n"})),
            reply(403, json!({})),
        ]);
        let got = client(&mock).get_all_followers("ali", &Pagination::default()).unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_stream_delivers_unseen_tweets_once() {
        let mock = MockTransport::scripted(vec![
            reply(200, json!({"tweets": [{"id": "1", "text": "a"}, {"id": "2", "text": "b"}]})),
            reply(200, json!({"tweets": [{"id": "2", "text": "b"}, {"id": "3", "text": "c"}]})),
        ]);
        let c = client(&mock);
        let opts = PollOptions {
            interval: Duration::from_millis(1),
            max_time: None,
            max_polls: Some(2),
            query_type: QueryType::Latest,
        };
        let mut got = Vec::new();
        let delivered = c.stream_tweets_by_query("سلام", &opts, |t| got.push(t.tweet_id.clone()));
        assert_eq!(delivered, 3);
        assert_eq!(got, vec!["1", "2", "3"]);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_query_type_parse() {
        assert_eq!("latest".parse::<QueryType>().unwrap(), QueryType::Latest);
        assert_eq!("Top".parse::<QueryType>().unwrap(), QueryType::Top);
        assert!("best".parse::<QueryType>().is_err());
    }
}
