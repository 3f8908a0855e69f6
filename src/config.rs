//! Configuration for the text pipeline and the API client.
//!
//! [`ProcessingConfig`] is the immutable bag each component reads once at
//! construction.  It deserialises from JSON with every field optional, so a
//! config file only needs to name what it overrides:
//!
//! ```json
//! {
//!   "language": "fa",
//!   "normalizer": { "remove_diacritics": true, "max_repeat": 2 },
//!   "noise_remover": { "preserve_hashtag_content": false },
//!   "content_filter": { "censoring_char": "#", "min_inappropriate_threshold": 0.2 }
//! }
//! ```
//!
//! [`ClientConfig`] is read from the environment (see [`ClientConfig::from_env`]).

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Text pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Persian expressions joined into a single token before word splitting.
pub const DEFAULT_MULTIWORD_EXPRESSIONS: &[&str] = &[
    "علی رغم",
    "با وجود این",
    "با این حال",
    "به طوری که",
    "از آنجایی که",
    "به دلیل",
    "از این رو",
    "با توجه به",
    "بر اساس",
    "بر طبق",
    "به منظور",
    "به عنوان",
    "به نظر می رسد",
    "به همین دلیل",
    "علاوه بر این",
    "در واقع",
    "در نتیجه",
    "اگرچه",
    "با این وجود",
    "در حالی که",
    "به طور کلی",
    "به عبارت دیگر",
    "به عبارتی",
];

/// Top-level configuration of [`TextProcessor`](crate::processor::TextProcessor)
/// and the components it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Primary language of the input (`"fa"` enables the Persian resources).
    pub language: String,
    /// Capacity of each memoisation cache; `0` disables memoisation.
    pub cache_size: usize,
    /// Worker count of [`TextProcessor::process_batch`](crate::processor::TextProcessor::process_batch).
    pub max_workers: usize,
    /// Add the social-media stopword set to the linguistic base list.
    pub include_domain_stopwords: bool,
    /// Extra stopwords supplied inline.
    pub custom_stopwords: Vec<String>,
    /// Optional stopword file (one word per line, `#` comments).
    pub stopwords_path: Option<PathBuf>,
    pub normalizer: NormalizerConfig,
    pub tokenizer: TokenizerConfig,
    pub noise_remover: NoiseConfig,
    pub content_filter: FilterConfig,
    pub batch: BatchConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            language: "fa".to_string(),
            cache_size: 1024,
            max_workers: 4,
            include_domain_stopwords: true,
            custom_stopwords: Vec::new(),
            stopwords_path: None,
            normalizer: NormalizerConfig::default(),
            tokenizer: TokenizerConfig::default(),
            noise_remover: NoiseConfig::default(),
            content_filter: FilterConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Parse a JSON config file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(Error::Config("language must not be empty".into()));
        }
        let threshold = self.content_filter.min_inappropriate_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "min_inappropriate_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.batch.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Toggles of the normalisation steps, applied in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub unicode_normalization: bool,
    pub fix_arabic_letters: bool,
    pub fix_arabic_numbers: bool,
    pub fix_english_numbers: bool,
    pub remove_diacritics: bool,
    pub remove_repeats: bool,
    /// Longest run of one character kept by `remove_repeats`.
    pub max_repeat: usize,
    pub fix_spacing: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            unicode_normalization: true,
            fix_arabic_letters: true,
            fix_arabic_numbers: true,
            fix_english_numbers: true,
            remove_diacritics: true,
            remove_repeats: true,
            max_repeat: 2,
            fix_spacing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub join_multiword_expr: bool,
    /// Tokens shorter than this (in characters) are dropped.
    pub min_word_length: usize,
    pub multiword_expressions: Vec<String>,
    /// Tab-separated `word<TAB>lemma` file backing the lemmatiser.
    pub lemma_dictionary_path: Option<PathBuf>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            join_multiword_expr: true,
            min_word_length: 2,
            multiword_expressions: DEFAULT_MULTIWORD_EXPRESSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lemma_dictionary_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Replace each emoji with one space instead of deleting it.
    pub preserve_emoji_length: bool,
    /// Strip only the `#` of a hashtag and keep its text.
    pub preserve_hashtag_content: bool,
    pub preserve_digits: bool,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            preserve_emoji_length: false,
            preserve_hashtag_content: true,
            preserve_digits: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub censoring_char: char,
    /// A text is inappropriate once `matches / words` reaches this ratio.
    pub min_inappropriate_threshold: f64,
    /// JSON lexicon merged over the defaults; also the persistence target.
    pub custom_words_path: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            censoring_char: '*',
            min_inappropriate_threshold: 0.1,
            custom_words_path: None,
        }
    }
}

/// How [`BatchProcessor`](crate::batch::BatchProcessor) runs its batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelMode {
    /// A fixed set of scoped worker threads pulling batches from a queue.
    Threads,
    /// A rayon work-stealing pool, used once the input exceeds
    /// [`BatchConfig::work_stealing_threshold`].
    WorkStealing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub parallel_mode: ParallelMode,
    pub max_workers: usize,
    pub batch_size: usize,
    pub work_stealing_threshold: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel_mode: ParallelMode::Threads,
            max_workers: 4,
            batch_size: 1000,
            work_stealing_threshold: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API client
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "https://api.twitterapi.io";

/// Settings of [`ApiClient`](crate::client::ApiClient), read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub cache_size: usize,
    pub cache_ttl_seconds: u64,
    pub max_retries: u32,
    pub base_retry_delay_seconds: f64,
    pub max_retry_delay_seconds: f64,
    pub connect_timeout_seconds: f64,
    pub read_timeout_seconds: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_size: 1000,
            cache_ttl_seconds: 300,
            max_retries: 3,
            base_retry_delay_seconds: 1.0,
            max_retry_delay_seconds: 60.0,
            connect_timeout_seconds: 3.05,
            read_timeout_seconds: 27.0,
        }
    }
}

impl ClientConfig {
    /// Build a config from `TWITTER_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparseable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(key) = lookup("TWITTER_API_KEY") {
            cfg.api_key = key;
        }
        if let Some(url) = lookup("TWITTER_API_BASE_URL") {
            cfg.base_url = url;
        }
        read_parsed(&lookup, "TWITTER_CACHE_SIZE", &mut cfg.cache_size);
        read_parsed(&lookup, "TWITTER_CACHE_TTL", &mut cfg.cache_ttl_seconds);
        read_parsed(&lookup, "TWITTER_API_MAX_RETRIES", &mut cfg.max_retries);
        read_parsed(&lookup, "TWITTER_API_BASE_RETRY_DELAY", &mut cfg.base_retry_delay_seconds);
        read_parsed(&lookup, "TWITTER_API_MAX_RETRY_DELAY", &mut cfg.max_retry_delay_seconds);
        read_parsed(&lookup, "TWITTER_API_CONNECT_TIMEOUT", &mut cfg.connect_timeout_seconds);
        read_parsed(&lookup, "TWITTER_API_READ_TIMEOUT", &mut cfg.read_timeout_seconds);

        if cfg.api_key.is_empty() {
            warn!("TWITTER_API_KEY is not set; requests will be sent unauthenticated");
        }
        cfg
    }

    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        secs(self.read_timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn max_retry_delay(&self) -> Duration {
        secs(self.max_retry_delay_seconds)
    }
}

fn read_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable setting"),
        }
    }
}

/// Seconds as a `Duration`, clamping negatives and NaN to zero and values
/// too large to represent to [`Duration::MAX`].
pub(crate) fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = ProcessingConfig::default();
        assert_eq!(cfg.language, "fa");
        assert_eq!(cfg.normalizer.max_repeat, 2);
        assert_eq!(cfg.tokenizer.min_word_length, 2);
        assert!(cfg.noise_remover.preserve_hashtag_content);
        assert_eq!(cfg.content_filter.censoring_char, '*');
        assert_eq!(cfg.batch.batch_size, 1000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = br##"{
            "noise_remover": { "preserve_hashtag_content": false },
            "content_filter": { "censoring_char": "#" },
            "batch": { "parallel_mode": "work_stealing" }
        }"##;
        let cfg = ProcessingConfig::from_json_slice(json).unwrap();
        assert!(!cfg.noise_remover.preserve_hashtag_content);
        assert!(cfg.noise_remover.preserve_digits);
        assert_eq!(cfg.content_filter.censoring_char, '#');
        assert_eq!(cfg.content_filter.min_inappropriate_threshold, 0.1);
        assert_eq!(cfg.batch.parallel_mode, ParallelMode::WorkStealing);
        assert_eq!(cfg.language, "fa");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let json = br#"{ "content_filter": { "min_inappropriate_threshold": 3.0 } }"#;
        assert!(matches!(
            ProcessingConfig::from_json_slice(json),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_client_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TWITTER_API_KEY", "k"),
            ("TWITTER_CACHE_SIZE", "100"),
            ("TWITTER_API_BASE_RETRY_DELAY", "0.01"),
            ("TWITTER_API_MAX_RETRIES", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let cfg = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.cache_size, 100);
        assert_eq!(cfg.base_retry_delay_seconds, 0.01);
        assert_eq!(cfg.max_retries, 3, "bad value must keep the default");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_secs_clamps() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(0.5), Duration::from_millis(500));
        assert_eq!(secs(1e30), Duration::MAX);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
    }
}
