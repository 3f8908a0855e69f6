//! Text pipeline orchestrator.
//!
//! [`TextProcessor`] owns one instance of every pipeline component and runs
//! them in this order:
//!
//! ```text
//! raw ─► NoiseRemover ─► Normalizer ─► Tokenizer ─► stopword filter ─► joined text
//! ```
//!
//! Noise goes first so that the normaliser never sees URLs or mentions.
//! `normalize`, `tokenize` and `is_appropriate` are memoised in bounded LRU
//! caches; batch workloads repeat the same short strings (hashtags, stock
//! phrases) constantly.

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, MutexGuard, RwLock},
};

use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::ProcessingConfig,
    error::Result,
    filter::{ContentFilter, ReplacementMethod},
    noise::{NoiseOptions, NoiseRemover},
    normalize::Normalizer,
    stopwords,
    tokenize::Tokenizer,
};

// ─────────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────────

/// Surface features of one text, read from the text as posted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Length in characters.
    pub length: usize,
    /// Tokens of the preprocessed text, stopwords included.
    pub word_count: usize,
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
    pub urls: Vec<String>,
    pub emojis: Vec<String>,
}

/// Outcome of one text's trip through [`TextProcessor::process_single`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTextResult {
    pub original: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_appropriate: Option<bool>,
    /// Censored text; present only when the original was flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedTextResult {
    pub fn failed(original: &str, error: impl Into<String>) -> Self {
        Self { original: original.to_string(), error: Some(error.into()), ..Self::default() }
    }
}

/// Stages of [`TextProcessor::preprocess_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub normalize: bool,
    pub remove_noise: bool,
    pub remove_stopwords: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self { normalize: true, remove_noise: true, remove_stopwords: true }
    }
}

/// Per-item work of [`TextProcessor::process_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub preprocess: bool,
    pub extract_features: bool,
    pub filter_inappropriate: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { preprocess: true, extract_features: false, filter_inappropriate: false }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounded memoisation
// ─────────────────────────────────────────────────────────────────────────────

/// String-keyed LRU memo.  Capacity 0 disables it.
struct Memo<V> {
    cache: Option<Mutex<LruCache<String, V>>>,
}

impl<V: Clone> Memo<V> {
    fn new(capacity: usize) -> Self {
        Self { cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))) }
    }

    fn lock(cache: &Mutex<LruCache<String, V>>) -> MutexGuard<'_, LruCache<String, V>> {
        // entries are plain values, a panicked holder leaves nothing half-written
        cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_or_compute(&self, key: &str, compute: impl FnOnce() -> V) -> V {
        let Some(cache) = &self.cache else {
            return compute();
        };
        if let Some(hit) = Self::lock(cache).get(key) {
            return hit.clone();
        }
        // computed outside the lock; a racing duplicate is harmless
        let value = compute();
        Self::lock(cache).put(key.to_string(), value.clone());
        value
    }

    fn clear(&self) {
        if let Some(cache) = &self.cache {
            Self::lock(cache).clear();
        }
    }

    fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| Self::lock(c).len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TextProcessor
// ─────────────────────────────────────────────────────────────────────────────

pub struct TextProcessor {
    config: ProcessingConfig,
    normalizer: Normalizer,
    tokenizer: Tokenizer,
    stopwords: HashSet<String>,
    noise: NoiseRemover,
    filter: RwLock<ContentFilter>,
    normalize_memo: Memo<String>,
    tokenize_memo: Memo<Vec<String>>,
    appropriate_memo: Memo<bool>,
    pool: Option<rayon::ThreadPool>,
}

impl TextProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        let mut stopwords = stopwords::get_stopwords(
            &config.language,
            config.include_domain_stopwords,
            Some(&config.custom_stopwords),
        );
        if let Some(path) = &config.stopwords_path {
            match stopwords::load_stopwords_from_file(path) {
                Ok(extra) => stopwords.extend(extra),
                Err(e) => warn!(path = %path.display(), error = %e, "stopword file unavailable"),
            }
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers.max(1))
            .thread_name(|i| format!("parsitweet-text-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "worker pool unavailable; batches run sequentially");
                None
            }
        };

        let processor = Self {
            normalizer: Normalizer::new(config.normalizer.clone()),
            tokenizer: Tokenizer::new(&config.language, &config.tokenizer),
            noise: NoiseRemover::new(config.noise_remover.clone()),
            filter: RwLock::new(ContentFilter::new(&config.content_filter)),
            normalize_memo: Memo::new(config.cache_size),
            tokenize_memo: Memo::new(config.cache_size),
            appropriate_memo: Memo::new(config.cache_size),
            stopwords,
            pool,
            config,
        };
        info!(
            language = %processor.config.language,
            stopwords = processor.stopwords.len(),
            workers = processor.config.max_workers,
            "text processor initialised"
        );
        processor
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn stopwords(&self) -> &HashSet<String> {
        &self.stopwords
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn noise_remover(&self) -> &NoiseRemover {
        &self.noise
    }

    fn read_filter(&self) -> std::sync::RwLockReadGuard<'_, ContentFilter> {
        self.filter.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Pipeline stages ──────────────────────────────────────────────────────

    /// Full pipeline: noise removal, normalisation, stopword removal.
    pub fn preprocess(&self, text: &str) -> String {
        self.preprocess_with(text, &PreprocessOptions::default())
    }

    pub fn preprocess_with(&self, text: &str, opts: &PreprocessOptions) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut out = text.to_string();
        if opts.remove_noise {
            out = self.noise.remove_all_noise(&out);
        }
        if opts.normalize {
            out = self.normalize(&out);
        }
        if opts.remove_stopwords {
            out = self
                .tokenize(&out, false)
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
        }
        out
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalize_memo.get_or_compute(text, || self.normalizer.normalize(text))
    }

    pub fn tokenize(&self, text: &str, keep_stopwords: bool) -> Vec<String> {
        let tokens = self.tokenize_memo.get_or_compute(text, || self.tokenizer.tokenize(text));
        if keep_stopwords {
            tokens
        } else {
            tokens.into_iter().filter(|t| !self.stopwords.contains(t)).collect()
        }
    }

    /// Links, mentions, hashtags and emoji only; punctuation and digits stay.
    pub fn remove_noise(&self, text: &str) -> String {
        self.noise.remove_noise(text, &NoiseOptions::default())
    }

    // ── Features & keywords ──────────────────────────────────────────────────

    /// Entities come from `text` itself; only the word count looks at the
    /// preprocessed copy.
    pub fn extract_features(&self, text: &str) -> FeatureSet {
        if text.is_empty() {
            return FeatureSet::default();
        }
        let clean = self.preprocess(text);
        FeatureSet {
            length: text.chars().count(),
            word_count: self.tokenize(&clean, true).len(),
            mentions: self.noise.extract_mentions(text),
            hashtags: self.noise.extract_hashtags(text),
            urls: self.noise.extract_urls(text),
            emojis: self.noise.extract_emojis(text),
        }
    }

    /// Top `top_n` terms by frequency (occurrences / tokens).  Ties keep
    /// first-appearance order.
    pub fn get_keywords(&self, text: &str, top_n: usize) -> Vec<(String, f64)> {
        let processed = self.preprocess(text);
        let tokens = self.tokenize(&processed, false);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut order: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            if token.chars().count() <= 1 {
                continue;
            }
            match index.get(token) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(token.clone(), order.len());
                    order.push((token.clone(), 1));
                }
            }
        }

        let total = tokens.len() as f64;
        let mut scored: Vec<(String, f64)> =
            order.into_iter().map(|(w, n)| (w, n as f64 / total)).collect();
        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_n);
        scored
    }

    // ── Content filter ───────────────────────────────────────────────────────

    pub fn is_appropriate(&self, text: &str) -> bool {
        // read guard spans the memo insert, so a verdict never outlives its lexicon
        let filter = self.read_filter();
        self.appropriate_memo.get_or_compute(text, || filter.is_appropriate(text))
    }

    pub fn get_inappropriate_score(&self, text: &str) -> f64 {
        self.read_filter().get_inappropriate_score(text)
    }

    pub fn get_inappropriate_words(&self, text: &str) -> Vec<String> {
        self.read_filter().get_inappropriate_words(text)
    }

    /// Censor every flagged word.
    pub fn filter_inappropriate(&self, text: &str) -> String {
        self.filter_with(text, ReplacementMethod::Censor)
    }

    pub fn filter_with(&self, text: &str, method: ReplacementMethod) -> String {
        self.read_filter().filter_text(text, method)
    }

    /// Extend the lexicon; cached appropriateness verdicts are dropped.
    pub fn add_inappropriate_words<I, S>(&self, words: I, persist: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = self.filter.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = filter.add_inappropriate_words(words, persist);
        self.appropriate_memo.clear();
        outcome
    }

    // ── Per-item and batch processing ────────────────────────────────────────

    /// Filter (if asked) first, so that preprocessing and features see the
    /// censored text.
    pub fn process_single(&self, text: &str, opts: &BatchOptions) -> ProcessedTextResult {
        let mut result = ProcessedTextResult { original: text.to_string(), ..Default::default() };
        let mut current = text.to_string();

        if opts.filter_inappropriate {
            let ok = self.is_appropriate(&current);
            result.is_appropriate = Some(ok);
            if !ok {
                current = self.filter_inappropriate(&current);
                result.filtered = Some(current.clone());
            }
        }
        if opts.preprocess {
            result.processed = Some(self.preprocess(&current));
        }
        if opts.extract_features {
            result.features = Some(self.extract_features(&current));
        }
        result
    }

    /// [`process_single`](Self::process_single) with panics turned into an
    /// `error` entry.
    pub fn process_guarded(&self, text: &str, opts: &BatchOptions) -> ProcessedTextResult {
        guarded(text, |t| self.process_single(t, opts))
    }

    /// Process `texts` on the worker pool.  Output order matches input order
    /// and one failing text never affects the others.
    pub fn process_batch(&self, texts: &[String], opts: &BatchOptions) -> Vec<ProcessedTextResult> {
        self.map_guarded(texts, |t| self.process_single(t, opts))
    }

    fn map_guarded<F>(&self, texts: &[String], work: F) -> Vec<ProcessedTextResult>
    where
        F: Fn(&str) -> ProcessedTextResult + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| texts.par_iter().map(|t| guarded(t, &work)).collect()),
            None => texts.iter().map(|t| guarded(t, &work)).collect(),
        }
    }

    /// Entries held by the three memo caches.
    pub fn memo_sizes(&self) -> (usize, usize, usize) {
        (self.normalize_memo.len(), self.tokenize_memo.len(), self.appropriate_memo.len())
    }
}

/// Run `work` on one text, turning a panic into that text's `error` entry.
fn guarded<F>(text: &str, work: F) -> ProcessedTextResult
where
    F: Fn(&str) -> ProcessedTextResult,
{
    match panic::catch_unwind(AssertUnwindSafe(|| work(text))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!(error = %msg, "text processing failed");
            ProcessedTextResult::failed(text, msg)
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> TextProcessor {
        TextProcessor::new(ProcessingConfig::default())
    }

    #[test]
    fn test_preprocess_pipeline() {
        let tp = processor();
        let out = tp.preprocess("RT @user سلام به همه!!! این کتاب خیلییییی خوب است https://t.co/x #کتاب");
        assert!(!out.contains("@user"), "got: {}", out);
        assert!(!out.contains("https"), "got: {}", out);
        assert!(out.contains("کتاب"), "got: {}", out);
        assert!(out.contains("سلام"), "got: {}", out);
        // stopwords gone
        assert!(!out.split(' ').any(|t| t == "این" || t == "است"), "got: {}", out);
    }

    #[test]
    fn test_preprocess_empty() {
        assert_eq!(processor().preprocess(""), "");
        assert!(processor().get_keywords("", 5).is_empty());
    }

    #[test]
    fn test_preprocess_stages_toggle() {
        let tp = processor();
        let opts = PreprocessOptions { normalize: false, remove_noise: false, remove_stopwords: false };
        assert_eq!(tp.preprocess_with("RT @a x", &opts), "RT @a x");
    }

    #[test]
    fn test_tokenize_keep_stopwords() {
        let tp = processor();
        let all = tp.tokenize("این کتاب است", true);
        let content = tp.tokenize("این کتاب است", false);
        assert_eq!(all.len(), 3, "got: {:?}", all);
        assert_eq!(content, vec!["کتاب"]);
    }

    #[test]
    fn test_features_from_original() {
        let tp = processor();
        let text = "سلام @علی ببین #خبر https://example.com 😊";
        let f = tp.extract_features(text);
        assert_eq!(f.length, text.chars().count());
        assert_eq!(f.mentions, vec!["علی"]);
        assert_eq!(f.hashtags, vec!["خبر"]);
        assert_eq!(f.urls, vec!["https://example.com"]);
        assert_eq!(f.emojis, vec!["😊"]);
        assert!(f.word_count >= 2, "got: {}", f.word_count);
        assert_eq!(tp.extract_features(""), FeatureSet::default());
    }

    #[test]
    fn test_keywords_frequency_and_ties() {
        let tp = processor();
        let kw = tp.get_keywords("ایران فوتبال ایران والیبال", 10);
        assert_eq!(kw[0].0, "ایران", "got: {:?}", kw);
        assert!((kw[0].1 - 0.5).abs() < 1e-9, "got: {:?}", kw);
        // tie keeps first-appearance order
        assert_eq!(kw[1].0, "فوتبال");
        assert_eq!(kw[2].0, "والیبال");
        assert_eq!(tp.get_keywords("ایران فوتبال ایران والیبال", 1).len(), 1);
    }

    #[test]
    fn test_filter_flow_in_single() {
        let tp = processor();
        let opts = BatchOptions { filter_inappropriate: true, ..BatchOptions::default() };
        let r = tp.process_single("تو احمق هستی", &opts);
        assert_eq!(r.is_appropriate, Some(false));
        assert_eq!(r.filtered.as_deref(), Some("تو **** هستی"));
        assert!(r.error.is_none());

        let r = tp.process_single("روز خوبی است", &opts);
        assert_eq!(r.is_appropriate, Some(true));
        assert!(r.filtered.is_none());
    }

    #[test]
    fn test_add_words_invalidates_memo() {
        let tp = processor();
        assert!(tp.is_appropriate("واژه‌جدید"));
        tp.add_inappropriate_words(["واژه‌جدید"], false).unwrap();
        assert!(!tp.is_appropriate("واژه‌جدید"));
    }

    #[test]
    fn test_memo_bounded() {
        let cfg = ProcessingConfig { cache_size: 2, ..ProcessingConfig::default() };
        let tp = TextProcessor::new(cfg);
        for t in ["یک", "دو", "سه", "چهار"] {
            tp.normalize(t);
        }
        assert_eq!(tp.memo_sizes().0, 2);

        let off = TextProcessor::new(ProcessingConfig { cache_size: 0, ..ProcessingConfig::default() });
        off.normalize("یک");
        assert_eq!(off.memo_sizes(), (0, 0, 0));
    }

    #[test]
    fn test_batch_preserves_order() {
        let tp = processor();
        let texts: Vec<String> = (0..50).map(|i| format!("متن شماره {} #تگ{}", i, i)).collect();
        let opts = BatchOptions { extract_features: true, ..BatchOptions::default() };
        let results = tp.process_batch(&texts, &opts);
        assert_eq!(results.len(), texts.len());
        for (r, t) in results.iter().zip(&texts) {
            assert_eq!(&r.original, t);
            assert!(r.processed.is_some());
            assert!(r.features.is_some());
        }
    }

    #[test]
    fn test_batch_isolates_failing_item() {
        let tp = processor();
        let opts = BatchOptions::default();
        let texts: Vec<String> = ["سلام دوستان", "خراب", "روز خوب"].iter().map(|s| s.to_string()).collect();
        let results = tp.map_guarded(&texts, |t| {
            if t == "خراب" {
                panic!("bad input");
            }
            tp.process_single(t, &opts)
        });
        assert_eq!(results.len(), 3);
        assert!(results[0].error.is_none() && results[2].error.is_none());
        assert_eq!(results[1].original, "خراب");
        assert_eq!(results[1].error.as_deref(), Some("bad input"));
        assert!(results[1].processed.is_none());
        assert_eq!(results[2].original, "روز خوب");
    }

    #[test]
    fn test_concurrent_lexicon_update_not_stale() {
        let tp = processor();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    tp.is_appropriate("واژه‌تازه");
                }
            });
            scope.spawn(|| tp.add_inappropriate_words(["واژه‌تازه"], false).unwrap());
        });
        assert!(!tp.is_appropriate("واژه‌تازه"));
    }

    #[test]
    fn test_result_serialization_skips_absent() {
        let r = ProcessedTextResult { original: "x".into(), processed: Some("x".into()), ..Default::default() };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, serde_json::json!({"original": "x", "processed": "x"}));
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
