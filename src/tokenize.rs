//! Word and sentence tokeniser.
//!
//! For Persian (`fa`) words are split with `\w+|[^\w\s]`.  Rust's `\w` is
//! Unicode-aware and includes the zero-width non-joiner, so `می‌روم` stays a
//! single token.  Known multi-word expressions are glued with `_` before
//! splitting and keep that joining character in the output.
//!
//! Other languages fall back to whitespace splitting and have no stemmer.

use std::{collections::HashMap, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::TokenizerConfig;
use crate::error::Result;
use crate::normalize::ZWNJ;

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").unwrap());

/// A sentence body followed by any run of terminators (`؟` included).
static RE_SENTENCE_FA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?؟\n]+[.!?؟]*").unwrap());

static RE_SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]").unwrap());

/// Compile the multi-word pattern, longest expression first so that
/// `با این وجود` wins over a shorter overlapping entry.  A space inside an
/// expression also matches a ZWNJ, as normalisation turns `می رسد` into
/// `می‌رسد`.
fn compile_multiword(expressions: &[String]) -> Option<Regex> {
    let mut sorted: Vec<&str> = expressions
        .iter()
        .map(|e| e.trim())
        .filter(|e| e.contains(' '))
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    sorted.dedup();

    let alternation = sorted
        .iter()
        .map(|e| {
            e.split(' ')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("[ \u{200C}]")
        })
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&format!("(?:{})", alternation)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "multi-word expression pattern rejected; joining disabled");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stemming and lemmatisation
// ─────────────────────────────────────────────────────────────────────────────

/// Suffixes removed by [`PersianStemmer`], longest first.
const PERSIAN_SUFFIXES: &[&str] = &[
    "\u{200C}ترین", "ترین", "\u{200C}های", "های", "\u{200C}ها", "ها", "\u{200C}تر", "تر",
    "ات", "ان", "یی",
];

/// Rule-based light stemmer: strips one inflectional suffix while keeping
/// a stem of at least two characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersianStemmer;

impl PersianStemmer {
    const MIN_STEM: usize = 2;

    pub fn stem(&self, word: &str) -> String {
        let mut stem = word;
        for suffix in PERSIAN_SUFFIXES {
            if let Some(rest) = stem.strip_suffix(suffix) {
                if rest.chars().count() >= Self::MIN_STEM {
                    stem = rest;
                    break;
                }
            }
        }
        let stem = stem.trim_end_matches(ZWNJ);
        match stem.strip_suffix('ۀ') {
            Some(rest) => format!("{}ه", rest),
            None => stem.to_string(),
        }
    }
}

/// Dictionary lemmatiser backed by a `word<TAB>lemma` file.
#[derive(Debug, Clone, Default)]
pub struct Lemmatizer {
    lemmas: HashMap<String, String>,
}

impl Lemmatizer {
    /// Read a tab-separated dictionary.  Blank lines, `#` comments and lines
    /// without a tab are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_tsv(&content))
    }

    pub fn from_tsv(content: &str) -> Self {
        let lemmas = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('\t'))
            .map(|(w, lemma)| (w.trim().to_string(), lemma.trim().to_string()))
            .filter(|(w, lemma)| !w.is_empty() && !lemma.is_empty())
            .collect();
        Self { lemmas }
    }

    pub fn len(&self) -> usize {
        self.lemmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lemmas.is_empty()
    }

    /// Dictionary lemma, or the word itself when unknown.
    pub fn lemmatize(&self, word: &str) -> String {
        self.lemmas.get(word).cloned().unwrap_or_else(|| word.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokenizer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Tokenizer {
    language: String,
    join_multiword: bool,
    min_word_length: usize,
    multiword: Option<Regex>,
    stemmer: Option<PersianStemmer>,
    lemmatizer: Option<Lemmatizer>,
}

impl Tokenizer {
    pub fn new(language: &str, config: &TokenizerConfig) -> Self {
        let is_fa = language == "fa";

        let lemmatizer = config.lemma_dictionary_path.as_deref().and_then(|path| {
            match Lemmatizer::from_file(path) {
                Ok(l) => {
                    info!(path = %path.display(), entries = l.len(), "loaded lemma dictionary");
                    Some(l)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "lemma dictionary unavailable");
                    None
                }
            }
        });

        Self {
            language: language.to_string(),
            join_multiword: config.join_multiword_expr,
            min_word_length: config.min_word_length,
            multiword: if is_fa { compile_multiword(&config.multiword_expressions) } else { None },
            stemmer: is_fa.then_some(PersianStemmer),
            lemmatizer,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Glue every known multi-word expression with `_`.
    pub fn join_multiword_expressions(&self, text: &str) -> String {
        match &self.multiword {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures| {
                    caps[0].replace(&[' ', ZWNJ][..], "_")
                })
                .into_owned(),
            None => text.to_string(),
        }
    }

    /// Split into word tokens, dropping tokens shorter than the configured
    /// minimum (in characters).
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let text = if self.join_multiword {
            self.join_multiword_expressions(text)
        } else {
            text.to_string()
        };

        let min = self.min_word_length;
        let keep = |t: &str| t.chars().count() >= min;

        if self.language == "fa" {
            RE_WORD
                .find_iter(&text)
                .map(|m| m.as_str())
                .filter(|t| keep(t))
                .map(String::from)
                .collect()
        } else {
            text.split_whitespace().filter(|t| keep(t)).map(String::from).collect()
        }
    }

    /// Split into trimmed, non-empty sentences.
    pub fn tokenize_sentences(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let pieces: Vec<&str> = if self.language == "fa" {
            RE_SENTENCE_FA.find_iter(text).map(|m| m.as_str()).collect()
        } else {
            RE_SENTENCE_SPLIT.split(text).collect()
        };
        pieces
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Lemmatise through the dictionary; a no-op without one.
    pub fn lemmatize(&self, tokens: &[String]) -> Vec<String> {
        match &self.lemmatizer {
            Some(l) => tokens.iter().map(|t| l.lemmatize(t)).collect(),
            None => tokens.to_vec(),
        }
    }

    /// Light stemming for Persian; a no-op for other languages.
    pub fn stem(&self, tokens: &[String]) -> Vec<String> {
        match &self.stemmer {
            Some(s) => tokens.iter().map(|t| s.stem(t)).collect(),
            None => tokens.to_vec(),
        }
    }
}

/// Space-joined n-grams; empty when `n == 0` or `n > tokens.len()`.
pub fn ngrams(tokens: &[String], n: usize) -> Vec<String> {
    if n == 0 || n > tokens.len() {
        return Vec::new();
    }
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fa() -> Tokenizer {
        Tokenizer::new("fa", &TokenizerConfig::default())
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = fa().tokenize("سلام دنیا، این یک تست است!");
        assert_eq!(tokens, vec!["سلام", "دنیا", "این", "یک", "تست", "است"], "got: {:?}", tokens);
    }

    #[test]
    fn test_zwnj_kept_inside_token() {
        let tokens = fa().tokenize("من می\u{200C}روم");
        assert_eq!(tokens, vec!["من", "می\u{200C}روم"]);
    }

    #[test]
    fn test_multiword_joined() {
        let tokens = fa().tokenize("با این حال او آمد");
        assert!(tokens.contains(&"با_این_حال".to_string()), "got: {:?}", tokens);
        assert!(!tokens.contains(&"حال".to_string()), "got: {:?}", tokens);
    }

    #[test]
    fn test_multiword_longest_first() {
        let t = fa();
        let out = t.join_multiword_expressions("با این وجود رفتیم");
        assert_eq!(out, "با_این_وجود رفتیم");
        let out = t.join_multiword_expressions("به نظر می\u{200C}رسد خوب است");
        assert_eq!(out, "به_نظر_می_رسد خوب است");
    }

    #[test]
    fn test_multiword_disabled() {
        let cfg = TokenizerConfig { join_multiword_expr: false, ..TokenizerConfig::default() };
        let tokens = Tokenizer::new("fa", &cfg).tokenize("با این حال");
        assert_eq!(tokens, vec!["با", "این", "حال"]);
    }

    #[test]
    fn test_min_length_filter() {
        let cfg = TokenizerConfig { min_word_length: 3, ..TokenizerConfig::default() };
        let tokens = Tokenizer::new("fa", &cfg).tokenize("او به خانه رفت");
        assert_eq!(tokens, vec!["خانه", "رفت"]);
        assert!(fa().tokenize("").is_empty());
    }

    #[test]
    fn test_non_persian_whitespace_split() {
        let t = Tokenizer::new("en", &TokenizerConfig::default());
        assert_eq!(t.tokenize("hello a world"), vec!["hello", "world"]);
        assert_eq!(t.stem(&["running".to_string()]), vec!["running"]);
        assert_eq!(t.tokenize_sentences("One. Two! Three?"), vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_persian_sentences() {
        let s = fa().tokenize_sentences("سلام. حالت خوبه؟ من خوبم!");
        assert_eq!(s, vec!["سلام.", "حالت خوبه؟", "من خوبم!"], "got: {:?}", s);
    }

    #[test]
    fn test_stemmer() {
        let s = PersianStemmer;
        assert_eq!(s.stem("کتاب\u{200C}ها"), "کتاب");
        assert_eq!(s.stem("درختان"), "درخت");
        assert_eq!(s.stem("بزرگترین"), "بزرگ");
        // stem would become too short
        assert_eq!(s.stem("تر"), "تر");
    }

    #[test]
    fn test_lemmatizer_noop_without_dictionary() {
        let tokens = vec!["رفتم".to_string()];
        assert_eq!(fa().lemmatize(&tokens), tokens);
    }

    #[test]
    fn test_lemmatizer_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nرفتم\tرفت#رو\nbad-line\n").unwrap();
        let cfg = TokenizerConfig {
            lemma_dictionary_path: Some(file.path().to_path_buf()),
            ..TokenizerConfig::default()
        };
        let t = Tokenizer::new("fa", &cfg);
        let out = t.lemmatize(&["رفتم".to_string(), "خانه".to_string()]);
        assert_eq!(out, vec!["رفت#رو", "خانه"]);
    }

    #[test]
    fn test_ngrams() {
        let tokens: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ngrams(&tokens, 2), vec!["a b", "b c"]);
        assert_eq!(ngrams(&tokens, 3), vec!["a b c"]);
        assert!(ngrams(&tokens, 0).is_empty());
        assert!(ngrams(&tokens, 4).is_empty());
    }
}
