//! # parsitweet
//!
//! Persian tweet text pipeline and a rate-limit aware client for a paginated
//! Twitter REST API.
//!
//! ## Quick start
//!
//! ```no_run
//! use parsitweet::{ProcessingConfig, TextProcessor};
//!
//! let processor = TextProcessor::new(ProcessingConfig::default());
//! let clean = processor.preprocess("RT @user: سلام   دوستان!!!! #خبر https://t.co/x");
//! let keywords = processor.get_keywords(&clean, 5);
//! ```
//!
//! Fetching and canonicalising tweets:
//!
//! ```no_run
//! use parsitweet::{ApiClient, ClientConfig, Pagination, UserRef};
//!
//! let client = ApiClient::new(ClientConfig::from_env());
//! let raw = client
//!     .get_all_user_tweets(&UserRef::Name("jack".into()), false, &Pagination::default())
//!     .unwrap_or_default();
//! let tweets: Vec<_> = raw.iter().map(|t| client.transformer().transform_tweet(t)).collect();
//! ```
//!
//! ## Text pipeline
//! 1. **Noise removal**: URLs, retweet markers, mentions, hashtags (content
//!    kept by default), emoji, extra whitespace.
//! 2. **Normalisation**: NFKC, Arabic → Persian letters and digits,
//!    diacritics, repeated characters, punctuation spacing and ZWNJ.
//! 3. **Tokenisation**: multi-word expressions joined with `_`, stopwords
//!    and short tokens dropped.
//! 4. **Content filter** (optional): lexicon match, score and censoring.
//!
//! ## API client
//! | Stage          | Module         |
//! |----------------|----------------|
//! | Response cache | [`cache`]      |
//! | Quota / backoff| [`rate_limit`] |
//! | HTTP           | [`transport`]  |
//! | Retry loop     | [`client`]     |
//! | Canonical form | [`transform`], [`models`] |

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod emoji;
pub mod error;
pub mod filter;
pub mod models;
pub mod noise;
pub mod normalize;
pub mod processor;
pub mod rate_limit;
pub mod stopwords;
pub mod tokenize;
pub mod transform;
pub mod transport;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use batch::{BatchProcessor, BatchStats};
pub use client::{ApiClient, Pagination, PollOptions, QueryType, UserRef};
pub use config::{ClientConfig, ParallelMode, ProcessingConfig};
pub use error::{ApiError, Error, Result};
pub use filter::{ContentFilter, ReplacementMethod};
pub use models::{CanonicalTweet, CanonicalUser};
pub use noise::NoiseRemover;
pub use normalize::Normalizer;
pub use processor::{BatchOptions, FeatureSet, ProcessedTextResult, TextProcessor};
pub use rate_limit::RateLimitManager;
pub use tokenize::Tokenizer;
pub use transform::DataTransformer;
