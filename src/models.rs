//! Canonical tweet and user records.
//!
//! Every upstream payload, whatever API generation produced it, is reduced
//! to these shapes by [`DataTransformer`](crate::transform::DataTransformer).
//! `tweet_id` is always a string, `created_at` is a parsed UTC timestamp or
//! `None`, and all four metrics are always present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub likes_count: i64,
    pub retweets_count: i64,
    pub replies_count: i64,
    pub quotes_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    /// Tag text without the leading `#`.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// User name without the leading `@`.
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntity {
    pub url: String,
    pub expanded_url: String,
    pub display_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub media_url: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub hashtags: Vec<Hashtag>,
    pub mentions: Vec<Mention>,
    pub urls: Vec<UrlEntity>,
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetMetadata {
    pub lang: String,
    pub source: String,
    pub possibly_sensitive: bool,
    pub coordinates: Option<Value>,
    pub place: Option<Value>,
    pub truncated: bool,
    pub is_retweet: bool,
    pub is_reply: bool,
    pub is_quote: bool,
    /// Set when the record is a fallback for an untransformable payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyInfo {
    pub in_reply_to_tweet_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    pub in_reply_to_username: Option<String>,
}

/// Author summary embedded in a tweet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetAuthor {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub profile_image_url: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTweet {
    pub tweet_id: String,
    pub text: String,
    pub full_text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user: TweetAuthor,
    pub metrics: Metrics,
    pub entities: Entities,
    pub metadata: TweetMetadata,
    pub reply_info: ReplyInfo,
    /// The upstream `entities` object, untouched.
    pub raw_entities: Map<String, Value>,
}

impl CanonicalTweet {
    /// Minimal record standing in for a payload that could not be read.
    pub fn fallback(tweet_id: Option<String>, text: String, error: String) -> Self {
        Self {
            tweet_id: tweet_id.unwrap_or_else(|| "unknown".to_string()),
            full_text: text.clone(),
            text,
            created_at: None,
            user: TweetAuthor { username: "unknown".to_string(), ..TweetAuthor::default() },
            metrics: Metrics::default(),
            entities: Entities::default(),
            metadata: TweetMetadata { error: Some(error), ..TweetMetadata::default() },
            reply_info: ReplyInfo::default(),
            raw_entities: Map::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub protected: bool,
    pub listed_count: i64,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalUser {
    pub user_id: String,
    pub twitter_id: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub location: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub tweets_count: i64,
    pub profile_image_url: String,
    pub verified: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub url: String,
    pub metadata: UserMetadata,
}
