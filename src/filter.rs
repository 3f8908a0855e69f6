//! Inappropriate-content filter.
//!
//! The lexicon maps every flagged word to exactly one replacement.  Words
//! added without an explicit replacement get a run of the censor character
//! of the same length.  One case-insensitive, word-bounded alternation is
//! compiled from the lexicon and rebuilt whenever it changes; an empty
//! lexicon compiles to no pattern at all and therefore matches nothing.
//!
//! On-disk lexicon format:
//!
//! ```json
//! { "words": ["کلمه"], "replacements": { "واژه": "[حذف]" } }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
    str::FromStr,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::FilterConfig;
use crate::error::{Error, Result};

const DEFAULT_WORDS: &[&str] = &[
    "فحش", "توهین", "زشت", "احمق", "نفهم", "بی‌شعور", "بیشعور", "عوضی", "آشغال",
    "کثافت", "لجن", "بی‌خاصیت", "بی‌لیاقت", "جاکش", "بی‌ناموس", "بیناموس",
    "حرامزاده", "قرتی", "گاو", "خر", "الاغ", "حیوان", "بی‌شرف", "بی‌وجدان",
    "کودن", "نادان", "ابله", "گوساله",
];

/// How [`ContentFilter::filter_text`] rewrites a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementMethod {
    /// Censor characters, one per matched character.
    #[default]
    Censor,
    /// Delete the match.
    Remove,
    /// The lexicon's replacement for the word.
    Custom,
}

impl FromStr for ReplacementMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "censor" => Ok(Self::Censor),
            "remove" => Ok(Self::Remove),
            "custom" => Ok(Self::Custom),
            other => Err(Error::InvalidArgument(format!(
                "unknown replacement method '{}'; expected censor, remove or custom",
                other
            ))),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    replacements: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    censoring_char: char,
    threshold: f64,
    custom_words_path: Option<std::path::PathBuf>,
    /// word → replacement
    lexicon: BTreeMap<String, String>,
    /// lowercased word → replacement, for case-insensitive custom lookup
    lookup: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl ContentFilter {
    /// Default Persian lexicon merged with the custom file, if configured.
    /// A missing or unreadable custom file is logged, never fatal.
    pub fn new(config: &FilterConfig) -> Self {
        let mut filter = Self::with_words(config, DEFAULT_WORDS.iter().copied());
        if let Some(path) = config.custom_words_path.clone() {
            filter.load_custom_lexicon(&path);
        }
        filter.rebuild();
        info!(words = filter.lexicon.len(), "content filter ready");
        filter
    }

    /// A filter over exactly `words`, ignoring any configured custom file.
    pub fn with_words<'a, I>(config: &FilterConfig, words: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filter = Self {
            censoring_char: config.censoring_char,
            threshold: config.min_inappropriate_threshold,
            custom_words_path: config.custom_words_path.clone(),
            lexicon: BTreeMap::new(),
            lookup: HashMap::new(),
            pattern: None,
        };
        for word in words {
            filter.insert_censored(word);
        }
        filter.rebuild();
        filter
    }

    fn censor(&self, word: &str) -> String {
        std::iter::repeat(self.censoring_char).take(word.chars().count()).collect()
    }

    fn insert_censored(&mut self, word: &str) {
        let word = word.trim();
        if word.is_empty() || self.lexicon.contains_key(word) {
            return;
        }
        let replacement = self.censor(word);
        self.lexicon.insert(word.to_string(), replacement);
    }

    fn load_custom_lexicon(&mut self, path: &Path) {
        if !path.exists() {
            warn!(path = %path.display(), "custom lexicon file not found");
            return;
        }
        let parsed = fs::read(path)
            .map_err(Error::from)
            .and_then(|bytes| serde_json::from_slice::<LexiconFile>(&bytes).map_err(Error::from));
        match parsed {
            Ok(file) => {
                for word in &file.words {
                    self.insert_censored(word);
                }
                for (word, replacement) in file.replacements {
                    let word = word.trim();
                    if !word.is_empty() {
                        self.lexicon.insert(word.to_string(), replacement);
                    }
                }
                info!(path = %path.display(), words = self.lexicon.len(), "loaded custom lexicon");
            }
            Err(e) => error!(path = %path.display(), error = %e, "failed to load custom lexicon"),
        }
    }

    /// Recompile the pattern and the lookup table from the lexicon.
    fn rebuild(&mut self) {
        self.lookup = self
            .lexicon
            .iter()
            .map(|(w, r)| (w.to_lowercase(), r.clone()))
            .collect();

        if self.lexicon.is_empty() {
            self.pattern = None;
            return;
        }
        let mut words: Vec<&String> = self.lexicon.keys().collect();
        // longest first so a word never loses to its own prefix
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");

        self.pattern = match Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)) {
            Ok(re) => Some(re),
            Err(e) => {
                error!(error = %e, "lexicon pattern failed to compile; filter disabled");
                None
            }
        };
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn lexicon_len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.lookup.contains_key(&word.to_lowercase())
    }

    pub fn replacement_for(&self, word: &str) -> Option<&str> {
        self.lookup.get(&word.to_lowercase()).map(String::as_str)
    }

    /// Every lexicon match, as written in `text`.
    pub fn get_inappropriate_words(&self, text: &str) -> Vec<String> {
        match &self.pattern {
            Some(re) => re.find_iter(text).map(|m| m.as_str().to_string()).collect(),
            None => Vec::new(),
        }
    }

    fn match_ratio(&self, text: &str) -> Option<f64> {
        let matches = self.pattern.as_ref()?.find_iter(text).count();
        if matches == 0 {
            return None;
        }
        let words = text.split_whitespace().count().max(1);
        Some(matches as f64 / words as f64)
    }

    /// True unless the share of flagged words reaches the threshold.
    pub fn is_appropriate(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return true;
        }
        match self.match_ratio(text) {
            Some(ratio) => ratio < self.threshold,
            None => true,
        }
    }

    /// Share of flagged words in `[0, 1]`.
    pub fn get_inappropriate_score(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        self.match_ratio(text).map_or(0.0, |r| r.min(1.0))
    }

    /// Rewrite every match, then collapse the whitespace left behind.
    ///
    /// `Custom` replacements may differ in length from the word.
    pub fn filter_text(&self, text: &str, method: ReplacementMethod) -> String {
        let Some(re) = &self.pattern else {
            return text.to_string();
        };
        let replaced = re.replace_all(text, |caps: &regex::Captures| {
            let matched = &caps[0];
            match method {
                ReplacementMethod::Censor => self.censor(matched),
                ReplacementMethod::Remove => String::new(),
                ReplacementMethod::Custom => self
                    .replacement_for(matched)
                    .map(String::from)
                    .unwrap_or_else(|| self.censor(matched)),
            }
        });
        replaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Add words with censor replacements and recompile.  With `persist` the
    /// full lexicon is written to the configured custom words file.
    pub fn add_inappropriate_words<I, S>(&mut self, words: I, persist: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.lexicon.len();
        for word in words {
            self.insert_censored(word.as_ref());
        }
        self.rebuild();
        info!(added = self.lexicon.len() - before, total = self.lexicon.len(), "lexicon extended");

        if persist {
            let path = self.custom_words_path.clone().ok_or_else(|| {
                Error::Lexicon("no custom_words_path configured to persist the lexicon".into())
            })?;
            self.save_lexicon(&path)?;
        }
        Ok(())
    }

    /// Write all words plus every replacement that is not a plain censor run.
    pub fn save_lexicon(&self, path: &Path) -> Result<()> {
        let file = LexiconFile {
            words: self.lexicon.keys().cloned().collect(),
            replacements: self
                .lexicon
                .iter()
                .filter(|(w, r)| **r != self.censor(w))
                .map(|(w, r)| (w.clone(), r.clone()))
                .collect(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Lexicon(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(path, json).map_err(|e| Error::Lexicon(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), words = file.words.len(), "lexicon saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ContentFilter {
        ContentFilter::new(&FilterConfig::default())
    }

    #[test]
    fn test_appropriate_clean_text() {
        let f = filter();
        assert!(f.is_appropriate("سلام دوست من"));
        assert!(f.is_appropriate(""));
        assert_eq!(f.get_inappropriate_score(""), 0.0);
    }

    #[test]
    fn test_flagged_text() {
        let f = filter();
        let text = "تو احمق هستی";
        assert!(!f.is_appropriate(text));
        assert_eq!(f.get_inappropriate_words(text), vec!["احمق"]);
        let score = f.get_inappropriate_score(text);
        assert!((score - 1.0 / 3.0).abs() < 1e-9, "got: {}", score);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 1 match in 10 words = exactly the 0.1 threshold
        let text = "احمق یک دو سه چهار پنج شش هفت هشت نه";
        assert!(!filter().is_appropriate(text));
        let text = "احمق یک دو سه چهار پنج شش هفت هشت نه ده";
        assert!(filter().is_appropriate(text));
    }

    #[test]
    fn test_word_boundaries() {
        let f = filter();
        // "خر" must not match inside "خرید"
        assert!(f.get_inappropriate_words("خرید کردم").is_empty());
        assert_eq!(f.get_inappropriate_words("ای خر"), vec!["خر"]);
    }

    #[test]
    fn test_censor_length() {
        let f = filter();
        let out = f.filter_text("او کثافت است", ReplacementMethod::Censor);
        assert_eq!(out, format!("او {} است", "*".repeat("کثافت".chars().count())));
    }

    #[test]
    fn test_remove_and_custom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.json");
        std::fs::write(
            &path,
            r#"{"words": ["Badword"], "replacements": {"ugly": "[x]"}}"#,
        )
        .unwrap();
        let cfg = FilterConfig { custom_words_path: Some(path), ..FilterConfig::default() };
        let f = ContentFilter::new(&cfg);
        assert!(f.contains_word("badword"));

        let out = f.filter_text("so UGLY and badword here", ReplacementMethod::Custom);
        assert_eq!(out, "so [x] and ******* here");
        let out = f.filter_text("so ugly and badword here", ReplacementMethod::Remove);
        assert_eq!(out, "so and here");
    }

    #[test]
    fn test_empty_lexicon_matches_nothing() {
        let f = ContentFilter::with_words(&FilterConfig::default(), std::iter::empty());
        assert_eq!(f.lexicon_len(), 0);
        assert!(f.is_appropriate("anything at all"));
        assert!(f.get_inappropriate_words("anything").is_empty());
        assert_eq!(f.filter_text("a  b", ReplacementMethod::Censor), "a  b");
    }

    #[test]
    fn test_missing_custom_file_not_fatal() {
        let cfg = FilterConfig {
            custom_words_path: Some("/nonexistent/lexicon.json".into()),
            ..FilterConfig::default()
        };
        assert_eq!(ContentFilter::new(&cfg).lexicon_len(), DEFAULT_WORDS.len());
    }

    #[test]
    fn test_add_words_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("lexicon.json");
        let cfg = FilterConfig { custom_words_path: Some(path.clone()), ..FilterConfig::default() };
        let mut f = ContentFilter::new(&cfg);
        assert!(f.is_appropriate("کلمه‌بد"));

        f.add_inappropriate_words(["کلمه‌بد"], true).unwrap();
        assert!(!f.is_appropriate("کلمه‌بد"));

        let reloaded = ContentFilter::new(&cfg);
        assert!(reloaded.contains_word("کلمه‌بد"));
        assert_eq!(reloaded.lexicon_len(), f.lexicon_len());
    }

    #[test]
    fn test_persist_without_path_errors() {
        let mut f = filter();
        assert!(matches!(f.add_inappropriate_words(["x"], true), Err(Error::Lexicon(_))));
        // the words are still added
        assert!(f.contains_word("x"));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("CENSOR".parse::<ReplacementMethod>().unwrap(), ReplacementMethod::Censor);
        assert!("blur".parse::<ReplacementMethod>().is_err());
    }
}
