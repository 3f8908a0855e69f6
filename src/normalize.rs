//! Persian text normaliser.
//!
//! Steps run in a fixed order, each behind its own toggle in
//! [`NormalizerConfig`]:
//!
//! 1. NFKC compatibility normalisation (folds Arabic presentation forms).
//! 2. Arabic → Persian letters (`ي ى` → `ی`, `ك` and its forms → `ک`) and
//!    Arabic-Indic digits → Persian digits.
//! 3. ASCII digits → Persian digits.
//! 4. Diacritic removal (U+064B–U+065F, U+0670).
//! 5. Collapse runs of three or more identical characters.
//! 6. Spacing: whitespace runs, ZWNJ after `می` / `نمی`, punctuation spacing.
//!
//! Spacing runs last because every earlier step can change character counts.

use fancy_regex::{Captures, Regex as FancyRegex};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizerConfig;

pub const ZWNJ: char = '\u{200C}';

// ─────────────────────────────────────────────────────────────────────────────
// Character tables
// ─────────────────────────────────────────────────────────────────────────────

const PERSIAN_DIGITS: [char; 10] = ['۰', '۱', '۲', '۳', '۴', '۵', '۶', '۷', '۸', '۹'];

fn persian_letter(c: char) -> Option<char> {
    match c {
        'ي' | 'ى' => Some('ی'),
        'ك' | 'ﮎ' | 'ﮏ' | 'ﮐ' | 'ﮑ' | 'ﻙ' | 'ﻚ' | 'ﻛ' | 'ﻜ' => Some('ک'),
        _ => None,
    }
}

fn arabic_indic_digit(c: char) -> Option<char> {
    match c {
        '\u{0660}'..='\u{0669}' => Some(PERSIAN_DIGITS[(c as u32 - 0x0660) as usize]),
        _ => None,
    }
}

fn ascii_digit(c: char) -> Option<char> {
    c.to_digit(10)
        .filter(|_| c.is_ascii_digit())
        .map(|d| PERSIAN_DIGITS[d as usize])
}

fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

// ─────────────────────────────────────────────────────────────────────────────
// Spacing patterns
// ─────────────────────────────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Verbal prefix standing alone before the next word.
static RE_VERBAL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(ن?می) ").unwrap());

static RE_SPACE_BEFORE_CLOSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.،؛:؟!»)\]}])").unwrap());

/// Punctuation glued to the following text.  Closing punctuation and the end
/// of input never get a space inserted before them.
static RE_MISSING_SPACE_AFTER: Lazy<FancyRegex> = Lazy::new(|| {
    FancyRegex::new(r"(\d?)([.،؛:؟!«(\[{])(?![\s.،؛:؟!»)\]}]|$)(\d?)").unwrap()
});

// ─────────────────────────────────────────────────────────────────────────────
// Normalizer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Run every enabled step.  Empty input yields an empty string.
    ///
    /// Idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let cfg = &self.config;

        let mut out: String = if cfg.unicode_normalization {
            text.nfkc().collect()
        } else {
            text.to_string()
        };

        if cfg.fix_arabic_letters {
            out = fix_arabic_letters(&out);
        }
        if cfg.fix_arabic_numbers {
            out = fix_arabic_numbers(&out);
        }
        if cfg.fix_english_numbers {
            out = fix_english_numbers(&out);
        }
        if cfg.remove_diacritics {
            out = remove_diacritics(&out);
        }
        if cfg.remove_repeats {
            out = collapse_repeats(&out, cfg.max_repeat);
        }
        if cfg.fix_spacing {
            out = fix_spacing(&out);
            // removing spaces before punctuation can splice runs together
            if cfg.remove_repeats {
                out = collapse_repeats(&out, cfg.max_repeat);
            }
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Individual steps
// ─────────────────────────────────────────────────────────────────────────────

/// `ي`/`ى` → `ی`, `ك` (and presentation forms) → `ک`, Arabic-Indic digits →
/// Persian digits.
pub fn fix_arabic_letters(text: &str) -> String {
    text.chars()
        .map(|c| persian_letter(c).or_else(|| arabic_indic_digit(c)).unwrap_or(c))
        .collect()
}

pub fn fix_arabic_numbers(text: &str) -> String {
    text.chars().map(|c| arabic_indic_digit(c).unwrap_or(c)).collect()
}

pub fn fix_english_numbers(text: &str) -> String {
    text.chars().map(|c| ascii_digit(c).unwrap_or(c)).collect()
}

pub fn remove_diacritics(text: &str) -> String {
    text.chars().filter(|&c| !is_diacritic(c)).collect()
}

/// Shorten every run of `>= 3` identical characters to `max_repeat`.
///
/// Runs of one or two are never touched, whatever `max_repeat` is.
pub fn collapse_repeats(text: &str, max_repeat: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        let keep = if run >= 3 { max_repeat } else { run };
        out.extend(std::iter::repeat(c).take(keep));
    }
    out
}

/// Whitespace and punctuation spacing.
pub fn fix_spacing(text: &str) -> String {
    let collapsed = RE_WHITESPACE.replace_all(text, " ");

    let joined = RE_VERBAL_PREFIX.replace_all(&collapsed, |caps: &regex::Captures| {
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        if whole < collapsed.len() {
            format!("{}{}", &caps[1], ZWNJ)
        } else {
            caps[0].to_string()
        }
    });

    let tightened = RE_SPACE_BEFORE_CLOSING.replace_all(&joined, "$1");

    let spaced = RE_MISSING_SPACE_AFTER
        .replace_all(&tightened, |caps: &Captures| {
            let before = caps.get(1).map_or("", |m| m.as_str());
            let punct = caps.get(2).map_or("", |m| m.as_str());
            let after = caps.get(3).map_or("", |m| m.as_str());
            // decimals and clock times stay intact
            if !before.is_empty() && !after.is_empty() && matches!(punct, "." | ":") {
                format!("{}{}{}", before, punct, after)
            } else {
                format!("{}{} {}", before, punct, after)
            }
        })
        .into_owned();

    spaced.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(text: &str) -> String {
        Normalizer::default().normalize(text)
    }

    #[test]
    fn test_empty() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("   "), "");
    }

    #[test]
    fn test_arabic_letters() {
        assert_eq!(fix_arabic_letters("علي كتاب"), "علی کتاب");
        assert_eq!(norm("كيف"), "کیف");
    }

    #[test]
    fn test_digits() {
        assert_eq!(fix_arabic_numbers("٣٤"), "۳۴");
        assert_eq!(fix_english_numbers("ab 42"), "ab ۴۲");
        let out = norm("سال 2024");
        assert_eq!(out, "سال ۲۰۲۴", "got: {}", out);
    }

    #[test]
    fn test_diacritics_removed() {
        assert_eq!(remove_diacritics("مُحَمَّد"), "محمد");
    }

    #[test]
    fn test_collapse_repeats() {
        assert_eq!(collapse_repeats("خیلییییی", 2), "خیلیی");
        assert_eq!(collapse_repeats("aa", 1), "aa");
        assert_eq!(collapse_repeats("aaab", 1), "ab");
        assert_eq!(collapse_repeats("", 2), "");
    }

    #[test]
    fn test_verbal_prefix_gets_zwnj() {
        let out = norm("من می روم و نمی خواهم");
        assert_eq!(out, "من می\u{200C}روم و نمی\u{200C}خواهم", "got: {}", out);
        // not a prefix inside a word
        let out = norm("کمی خوب");
        assert_eq!(out, "کمی خوب", "got: {}", out);
    }

    #[test]
    fn test_punctuation_spacing() {
        let out = fix_spacing("سلام  ،خوبی ؟بله.");
        assert_eq!(out, "سلام، خوبی؟ بله.", "got: {}", out);
        assert_eq!(fix_spacing("ساعت 12:30 و 3.14"), "ساعت 12:30 و 3.14");
        assert_eq!(fix_spacing("(متن)"), "( متن)");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "سلام  دنیا!!!   چطوری؟؟؟",
            "من می روم . بعدا ! ! ! میام",
            "كتاب ٣ و 4 تا (( خوب ))",
            "متن… با، «نقل‌قول» و [کروشه]",
            "!می رود",
            "خیلییییی عالیه 😊😊😊😊",
        ];
        for s in samples {
            let once = norm(s);
            let twice = norm(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_toggles_respected() {
        let cfg = NormalizerConfig {
            fix_english_numbers: false,
            fix_spacing: false,
            ..NormalizerConfig::default()
        };
        let out = Normalizer::new(cfg).normalize("a  12");
        assert_eq!(out, "a  12");
    }
}
