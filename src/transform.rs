//! Upstream JSON → canonical records.
//!
//! The upstream API has returned the same logical data in several shapes over
//! its lifetime. Everything shape-specific lives here:
//!
//! | Container                         | Handled by                  |
//! |-----------------------------------|-----------------------------|
//! | `[tweet, ...]`                    | [`extract_tweets_list`]     |
//! | `{"tweets": [tweet, ...]}`        | [`extract_tweets_list`]     |
//! | `{"tweets": {"results": [...]}}`  | [`extract_tweets_list`]     |
//! | `{"results": [...]}`              | [`extract_tweets_list`]     |
//! | a single tweet object             | [`extract_tweets_list`]     |
//! | `[user, ...]` / `{"users": [...]}`| [`DataTransformer::transform_users_batch`] |
//!
//! Per-field extraction walks an ordered list of candidate keys and takes the
//! first one that is present and non-empty.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{
    CanonicalTweet, CanonicalUser, Entities, Hashtag, Media, Mention, Metrics, ReplyInfo,
    TweetAuthor, TweetMetadata, UrlEntity, UserMetadata,
};
use crate::noise::NoiseRemover;

// ─────────────────────────────────────────────────────────────────────────────
// Key chains
// ─────────────────────────────────────────────────────────────────────────────

const TWEET_ID_KEYS: &[&str] = &["id", "id_str", "tweet_id", "tweetId", "twitter_id", "twitterId"];
const TEXT_KEYS: &[&str] = &["text", "full_text", "tweet", "content"];

const LIKES_KEYS: &[&str] = &["likeCount", "favorite_count", "likes", "favoriteCount", "likesCount"];
const RETWEETS_KEYS: &[&str] = &["retweetCount", "retweet_count", "retweets", "retweetsCount"];
const REPLIES_KEYS: &[&str] = &["replyCount", "reply_count", "replies", "repliesCount"];
const QUOTES_KEYS: &[&str] = &["quoteCount", "quote_count", "quotes", "quotesCount"];

const REPLY_TWEET_KEYS: &[&str] =
    &["in_reply_to_status_id", "in_reply_to_status_id_str", "inReplyToId", "replyToId"];
const REPLY_USER_KEYS: &[&str] =
    &["in_reply_to_user_id", "in_reply_to_user_id_str", "inReplyToUserId", "replyToUserId"];
const REPLY_USERNAME_KEYS: &[&str] =
    &["in_reply_to_screen_name", "inReplyToUserName", "replyToUserName"];

/// Date layouts tried in order before the generic ISO-8601 fallbacks.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
];

/// Classic v1.1 layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const CLASSIC_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

static RE_ISO_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})T(\d{2}:\d{2}:\d{2})").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Value helpers
// ─────────────────────────────────────────────────────────────────────────────

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Scalar rendered as a string; containers and null give `None`.
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// First key that is present and truthy, as a string.
fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter(|v| truthy(v))
        .find_map(scalar_string)
}

/// First key that is present, as a string (empty values count).
fn first_present(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(scalar_string)
        .unwrap_or_default()
}

/// First present key whose value reads as an integer.
fn first_int(obj: &Map<String, Value>, keys: &[&str]) -> i64 {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(as_int)
        .unwrap_or(0)
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).map_or(false, truthy)
}

fn non_null(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    obj.get(key).filter(|v| !v.is_null()).cloned()
}

/// `isRetweet`-style flag, else presence of a non-null legacy field.
fn flag_or_present(obj: &Map<String, Value>, key: &str, legacy: &str) -> bool {
    match obj.get(key) {
        Some(v) => truthy(v),
        None => obj.get(legacy).map_or(false, |v| !v.is_null()),
    }
}

/// Object members of the array under `key`; anything else is skipped.
fn objects<'a>(obj: &'a Map<String, Value>, key: &str) -> Vec<&'a Map<String, Value>> {
    match obj.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

fn strip_sigil(s: &str, sigil: char) -> String {
    s.strip_prefix(sigil).unwrap_or(s).to_string()
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn keys_of(obj: &Map<String, Value>) -> Vec<&str> {
    obj.keys().map(String::as_str).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Dates
// ─────────────────────────────────────────────────────────────────────────────

/// Parse an upstream timestamp. Naive layouts are read as UTC.
///
/// Returns `None` (with a warning) when no layout matches; never substitutes
/// the current time.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_str(s, CLASSIC_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    let iso = match s.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => s.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    if let Some(caps) = RE_ISO_PREFIX.captures(s) {
        let joined = format!("{} {}", &caps[1], &caps[2]);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S") {
            return Some(naive.and_utc());
        }
    }

    warn!(date = s, "unparseable date");
    None
}

fn date_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter(|v| truthy(v))
        .find_map(Value::as_str)
        .and_then(parse_date)
}

// ─────────────────────────────────────────────────────────────────────────────
// Container shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Pull the list of tweet objects out of any known container shape.
///
/// A single object carrying an id key is wrapped into a one-element list.
/// Unknown shapes log their top-level keys (or JSON type) and yield nothing.
pub fn extract_tweets_list(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => {
            match obj.get("tweets") {
                Some(Value::Array(items)) => return items.iter().collect(),
                Some(Value::Object(inner)) => {
                    if let Some(Value::Array(items)) = inner.get("results") {
                        return items.iter().collect();
                    }
                }
                _ => {}
            }
            if let Some(Value::Array(items)) = obj.get("results") {
                return items.iter().collect();
            }
            if ["id", "tweet_id", "twitter_id"].iter().any(|k| obj.contains_key(*k)) {
                return vec![data];
            }
            warn!(keys = ?keys_of(obj), "unknown tweets container");
            Vec::new()
        }
        other => {
            warn!(kind = json_type(other), "unknown tweets container");
            Vec::new()
        }
    }
}

fn extract_users_list(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => match obj.get("users") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => {
                warn!(keys = ?keys_of(obj), "unknown users container");
                Vec::new()
            }
        },
        other => {
            warn!(kind = json_type(other), "unknown users container");
            Vec::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DataTransformer
// ─────────────────────────────────────────────────────────────────────────────

/// Maps raw upstream objects onto [`CanonicalTweet`] / [`CanonicalUser`].
///
/// Never fails: payloads that cannot be read become minimal records with
/// `metadata.error` set.
#[derive(Debug, Clone, Default)]
pub struct DataTransformer {
    noise: NoiseRemover,
}

impl DataTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform_tweet(&self, raw: &Value) -> CanonicalTweet {
        let Some(obj) = raw.as_object() else {
            warn!(kind = json_type(raw), "tweet payload is not an object");
            return CanonicalTweet::fallback(
                None,
                String::new(),
                format!("expected object, got {}", json_type(raw)),
            );
        };

        let text = first_string(obj, TEXT_KEYS).unwrap_or_default();
        let raw_entities = match obj.get("entities") {
            Some(Value::Object(e)) => e.clone(),
            _ => Map::new(),
        };

        CanonicalTweet {
            tweet_id: first_string(obj, TWEET_ID_KEYS).unwrap_or_else(|| "unknown".to_string()),
            full_text: self.full_text(obj, &text),
            created_at: date_field(obj, &["createdAt", "created_at"]),
            user: self.author(obj),
            metrics: self.metrics(obj),
            entities: self.entities(&raw_entities, &text),
            metadata: self.metadata(obj),
            reply_info: self.reply_info(obj),
            raw_entities,
            text,
        }
    }

    pub fn transform_tweets_batch(&self, data: &Value) -> Vec<CanonicalTweet> {
        let tweets: Vec<CanonicalTweet> =
            extract_tweets_list(data).into_iter().map(|t| self.transform_tweet(t)).collect();
        debug!(count = tweets.len(), "transformed tweets");
        tweets
    }

    pub fn transform_user(&self, raw: &Value) -> CanonicalUser {
        let Some(obj) = raw.as_object() else {
            warn!(kind = json_type(raw), "user payload is not an object");
            return CanonicalUser {
                username: "unknown".to_string(),
                metadata: UserMetadata {
                    error: Some(format!("expected object, got {}", json_type(raw))),
                    ..UserMetadata::default()
                },
                ..CanonicalUser::default()
            };
        };

        let username = first_present(obj, &["userName", "username", "screen_name"]);
        CanonicalUser {
            user_id: first_present(obj, &["id", "userId"]),
            twitter_id: first_present(obj, &["id_str", "id"]),
            username: strip_sigil(&username, '@'),
            display_name: first_present(obj, &["displayName", "name"]),
            bio: first_present(obj, &["description", "bio"]),
            location: first_present(obj, &["location"]),
            followers_count: first_int(obj, &["followers", "followers_count"]),
            following_count: first_int(obj, &["following", "friends_count"]),
            tweets_count: first_int(obj, &["tweets", "statuses_count"]),
            profile_image_url: first_present(obj, &["profileImageUrl", "profile_image_url"]),
            verified: flag_or_present_bool(obj, "isBlueVerified", "verified"),
            created_at: date_field(obj, &["created_at", "createdAt"]),
            url: first_present(obj, &["url"]),
            metadata: UserMetadata {
                protected: flag(obj, "protected"),
                listed_count: first_int(obj, &["listed_count"]),
                language: first_present(obj, &["lang"]),
                error: None,
            },
        }
    }

    pub fn transform_users_batch(&self, data: &Value) -> Vec<CanonicalUser> {
        extract_users_list(data).into_iter().map(|u| self.transform_user(u)).collect()
    }

    // ── Field extractors ──────────────────────────────────────────────────

    fn full_text(&self, obj: &Map<String, Value>, text: &str) -> String {
        if let Some(s) = obj.get("full_text").and_then(Value::as_str) {
            return s.to_string();
        }
        obj.get("extended_tweet")
            .and_then(|e| e.get("full_text"))
            .and_then(Value::as_str)
            .map_or_else(|| text.to_string(), str::to_string)
    }

    fn author(&self, obj: &Map<String, Value>) -> TweetAuthor {
        if let Some(Value::Object(a)) = obj.get("author") {
            let username = first_present(a, &["userName", "username"]);
            return TweetAuthor {
                user_id: first_present(a, &["id"]),
                username: strip_sigil(&username, '@'),
                display_name: first_present(a, &["displayName", "name"]),
                profile_image_url: first_present(a, &["profileImageUrl", "profile_image_url"]),
                verified: flag_or_present_bool(a, "isBlueVerified", "verified"),
            };
        }
        if let Some(Value::Object(u)) = obj.get("user") {
            let username = first_present(u, &["screen_name", "username"]);
            return TweetAuthor {
                user_id: first_present(u, &["id", "id_str"]),
                username: strip_sigil(&username, '@'),
                display_name: first_present(u, &["name"]),
                profile_image_url: first_present(
                    u,
                    &["profile_image_url_https", "profile_image_url"],
                ),
                verified: flag(u, "verified"),
            };
        }
        TweetAuthor::default()
    }

    fn metrics(&self, obj: &Map<String, Value>) -> Metrics {
        Metrics {
            likes_count: first_int(obj, LIKES_KEYS),
            retweets_count: first_int(obj, RETWEETS_KEYS),
            replies_count: first_int(obj, REPLIES_KEYS),
            quotes_count: first_int(obj, QUOTES_KEYS),
        }
    }

    fn entities(&self, raw: &Map<String, Value>, text: &str) -> Entities {
        let mut hashtags: Vec<Hashtag> = objects(raw, "hashtags")
            .into_iter()
            .filter_map(|h| h.get("text").and_then(Value::as_str))
            .map(|t| Hashtag { text: strip_sigil(t, '#') })
            .collect();

        let mut mentions: Vec<Mention> = objects(raw, "user_mentions")
            .into_iter()
            .filter_map(|m| {
                let name = m.get("screen_name").and_then(Value::as_str)?;
                Some(Mention {
                    username: strip_sigil(name, '@'),
                    user_id: first_string(m, &["id", "id_str"]),
                })
            })
            .collect();

        let urls = objects(raw, "urls")
            .into_iter()
            .map(|u| {
                let url = first_present(u, &["url"]);
                UrlEntity {
                    expanded_url: first_string(u, &["expanded_url"]).unwrap_or_else(|| url.clone()),
                    display_url: first_present(u, &["display_url"]),
                    url,
                }
            })
            .collect();

        let media = objects(raw, "media")
            .into_iter()
            .map(|m| Media {
                media_url: first_present(m, &["media_url_https", "media_url"]),
                media_type: first_present(m, &["type"]),
                url: first_present(m, &["url"]),
            })
            .collect();

        if hashtags.is_empty() {
            hashtags = self
                .noise
                .extract_hashtags(text)
                .into_iter()
                .map(|text| Hashtag { text })
                .collect();
        }
        if mentions.is_empty() {
            mentions = self
                .noise
                .extract_mentions(text)
                .into_iter()
                .map(|username| Mention { username, user_id: None })
                .collect();
        }

        Entities { hashtags, mentions, urls, media }
    }

    fn metadata(&self, obj: &Map<String, Value>) -> TweetMetadata {
        TweetMetadata {
            lang: first_present(obj, &["lang", "language"]),
            source: first_present(obj, &["source"]),
            possibly_sensitive: flag(obj, "possibly_sensitive"),
            coordinates: non_null(obj, "coordinates"),
            place: non_null(obj, "place"),
            truncated: flag(obj, "truncated"),
            is_retweet: flag_or_present(obj, "isRetweet", "retweeted_status"),
            is_reply: flag_or_present(obj, "isReply", "in_reply_to_status_id"),
            is_quote: flag_or_present(obj, "isQuote", "quoted_status_id"),
            error: None,
        }
    }

    fn reply_info(&self, obj: &Map<String, Value>) -> ReplyInfo {
        ReplyInfo {
            in_reply_to_tweet_id: first_string(obj, REPLY_TWEET_KEYS),
            in_reply_to_user_id: first_string(obj, REPLY_USER_KEYS),
            in_reply_to_username: first_string(obj, REPLY_USERNAME_KEYS),
        }
    }
}

/// Newer boolean key if present, else the legacy boolean key.
fn flag_or_present_bool(obj: &Map<String, Value>, key: &str, legacy: &str) -> bool {
    match obj.get(key) {
        Some(v) => truthy(v),
        None => flag(obj, legacy),
    }
}
