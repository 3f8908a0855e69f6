//! Tweet noise removal.
//!
//! [`NoiseRemover::remove_noise`] runs the enabled steps in a fixed order,
//! each on the output of the previous one:
//!
//! URLs → retweet markers → mentions → hashtags → emoji → special characters
//! → digits → `...` runs → whitespace → trim.
//!
//! The extractors never modify text and always report what is present in the
//! text they are given.  `\w` is Unicode-aware here, which is what makes
//! Persian hashtags and mentions match.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::NoiseConfig;
use crate::emoji;

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static RE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());
static RE_HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

static RE_RT_LEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^RT\s+").unwrap());
static RE_RT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brt\b").unwrap());
static RE_RETWEET_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bretweet\b").unwrap());

/// Anything but word characters, whitespace and basic ASCII punctuation.
static RE_SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s.,;:!?()\[\]{}'"\-_]"#).unwrap());

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static RE_DOT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Step selection
// ─────────────────────────────────────────────────────────────────────────────

/// Which steps [`NoiseRemover::remove_noise`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseOptions {
    pub links: bool,
    pub retweets: bool,
    pub mentions: bool,
    pub hashtags: bool,
    pub emojis: bool,
    pub special_chars: bool,
    pub extra_spaces: bool,
    pub digits: bool,
}

impl Default for NoiseOptions {
    fn default() -> Self {
        Self {
            links: true,
            retweets: true,
            mentions: true,
            hashtags: true,
            emojis: true,
            special_chars: false,
            extra_spaces: true,
            digits: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NoiseRemover
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NoiseRemover {
    config: NoiseConfig,
}

impl NoiseRemover {
    pub fn new(config: NoiseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    /// Every step enabled; digits are removed only when `preserve_digits` is
    /// off.
    pub fn remove_all_noise(&self, text: &str) -> String {
        let opts = NoiseOptions {
            special_chars: true,
            digits: !self.config.preserve_digits,
            ..NoiseOptions::default()
        };
        self.remove_noise(text, &opts)
    }

    pub fn remove_noise(&self, text: &str, opts: &NoiseOptions) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut out = text.to_string();

        if opts.links {
            out = self.remove_urls(&out);
        }
        if opts.retweets {
            out = self.remove_retweets(&out);
        }
        if opts.mentions {
            out = self.remove_mentions(&out);
        }
        if opts.hashtags {
            out = self.remove_hashtags(&out, self.config.preserve_hashtag_content);
        }
        if opts.emojis {
            out = self.remove_emojis(&out, self.config.preserve_emoji_length);
        }
        if opts.special_chars {
            out = self.remove_special_chars(&out);
        }
        if opts.digits {
            out = self.remove_digits(&out);
        }
        out = RE_DOT_RUN.replace_all(&out, " ... ").into_owned();
        if opts.extra_spaces {
            out = self.remove_extra_spaces(&out);
        }
        out.trim().to_string()
    }

    // ── Individual steps ─────────────────────────────────────────────────────

    pub fn remove_urls(&self, text: &str) -> String {
        RE_URL.replace_all(text, " ").into_owned()
    }

    pub fn remove_mentions(&self, text: &str) -> String {
        RE_MENTION.replace_all(text, " ").into_owned()
    }

    /// With `preserve_content` only the `#` goes; otherwise the whole tag.
    pub fn remove_hashtags(&self, text: &str, preserve_content: bool) -> String {
        if preserve_content {
            RE_HASHTAG.replace_all(text, "$1").into_owned()
        } else {
            RE_HASHTAG.replace_all(text, " ").into_owned()
        }
    }

    /// With `preserve_length` each emoji becomes exactly one space.
    pub fn remove_emojis(&self, text: &str, preserve_length: bool) -> String {
        emoji::strip(text, preserve_length)
    }

    pub fn remove_special_chars(&self, text: &str) -> String {
        RE_SPECIAL.replace_all(text, " ").into_owned()
    }

    pub fn remove_digits(&self, text: &str) -> String {
        RE_DIGITS.replace_all(text, " ").into_owned()
    }

    /// Leading `RT `, any standalone `rt` and the word `retweet`.
    pub fn remove_retweets(&self, text: &str) -> String {
        let out = RE_RT_LEADING.replace(text, "");
        let out = RE_RT_WORD.replace_all(&out, " ");
        RE_RETWEET_WORD.replace_all(&out, " ").into_owned()
    }

    pub fn remove_extra_spaces(&self, text: &str) -> String {
        RE_SPACES.replace_all(text, " ").into_owned()
    }

    // ── Extractors ───────────────────────────────────────────────────────────

    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        RE_URL.find_iter(text).map(|m| m.as_str().to_string()).collect()
    }

    /// Mentioned user names, without the `@`.
    pub fn extract_mentions(&self, text: &str) -> Vec<String> {
        RE_MENTION.captures_iter(text).map(|c| c[1].to_string()).collect()
    }

    /// Hashtag texts, without the `#`.
    pub fn extract_hashtags(&self, text: &str) -> Vec<String> {
        RE_HASHTAG.captures_iter(text).map(|c| c[1].to_string()).collect()
    }

    pub fn extract_emojis(&self, text: &str) -> Vec<String> {
        emoji::extract(text)
    }
}
