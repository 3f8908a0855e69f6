//! Stopword sets.
//!
//! [`get_stopwords`] unions three sources: a linguistic base list for the
//! language, the social-media set (platform vocabulary and colloquial verb
//! forms common on Persian Twitter), and caller-supplied words.

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::Write,
    path::Path,
};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Built-in lists
// ─────────────────────────────────────────────────────────────────────────────

const PERSIAN_BASE: &[&str] = &[
    "و", "در", "به", "از", "که", "این", "آن", "را", "با", "است", "برای", "یک",
    "تا", "بر", "هم", "نیز", "اما", "یا", "اگر", "پس", "چون", "چند", "هر", "همه",
    "دیگر", "ما", "من", "تو", "او", "شما", "ایشان", "آنها", "اینها", "آنان", "ها",
    "های", "خود", "خویش", "همین", "همان", "چنین", "چنان", "آنچه", "هیچ", "بی",
    "باید", "نباید", "شاید", "بود", "بودن", "باشد", "باشند", "هست", "هستند",
    "نیست", "نیستند", "شد", "شده", "شود", "شوند", "کرد", "کرده", "کند", "کنند",
    "کنیم", "کنم", "داد", "داده", "دهد", "دارد", "دارند", "داشت", "داشته",
    "گفت", "گفته", "می", "نمی", "خواهد", "خواهند", "توان", "تواند", "میان",
    "بین", "روی", "زیر", "پیش", "پیشتر", "بعد", "قبل", "نزد", "درباره", "مانند",
    "مثل", "بدون", "جز", "غیر", "سوی", "طرف", "توسط", "وسیله", "طی", "حتی",
    "ولی", "لیکن", "بلکه", "زیرا", "چرا", "چه", "چی", "کجا", "کی", "کدام",
    "چگونه", "چطور", "آیا", "بله", "نه", "خیر", "را", "هنوز", "همچنین", "همواره",
    "البته", "فقط", "تنها", "بسیار", "خیلی", "کمی", "بیشتر", "کمتر", "دو", "سه",
    "اول", "دوم", "اینکه", "آنکه", "وقتی", "زمانی", "جایی", "کسی", "چیزی",
    "همچون", "ای", "اش", "ام", "ات", "مان", "تان", "شان", "یعنی", "باز", "سپس",
    "اکنون", "اینجا", "آنجا", "دیگری", "برخی", "بعضی", "کل", "تمام", "همگی",
    "بنابراین", "ضمن", "علیه", "طبق", "نسبت",
];

/// Platform vocabulary and colloquial verb forms.
pub const PERSIAN_TWITTER_STOPWORDS: &[&str] = &[
    "rt", "فالو", "لایک", "ریتوییت", "فالوبک", "هشتگ", "توییت", "ریپلای",
    "منشن", "ترند", "پروفایل", "کامنت", "فالور", "فالویینگ", "دی‌ام", "بیو",
    "فالوور", "آیدی", "یوزر", "یوزرنیم", "توییتر", "امروز", "اکنون", "الان",
    "کنید", "کرد", "کردند", "داره", "داشت", "دارد", "هست", "بود", "بودند",
    "شد", "شده", "شدند", "نیست", "باشد", "باشه", "باشید", "شده_است", "رفت",
    "رفتند", "می‌روم", "می‌رود", "می‌روند", "بیا", "بیاید", "آمد", "آمدند",
    "میاد", "میام", "اومد", "اومدم", "اومدن", "میگه", "میگم", "میگن", "گفت",
    "گفتم", "گفتند", "بگو", "بگه", "گف", "گفتش", "میدم", "میده", "میدن", "داد",
    "دادم", "دادند", "بده", "بدید", "میشه", "میشم", "میشن", "شدم", "شدیم",
    "نمیشه", "خوب", "بد", "خوبه", "چرا", "چطور", "کجا", "چه", "چی",
];

const ENGLISH_BASE: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "at", "by", "for", "with",
    "about", "to", "from", "in", "on", "off", "out", "over", "under", "is", "are",
    "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "i", "me", "my", "we", "our", "you", "your", "he", "him", "his",
    "she", "her", "it", "its", "they", "them", "their", "this", "that", "these",
    "those", "what", "which", "who", "whom", "there", "here", "when", "where",
    "why", "how", "all", "any", "both", "each", "few", "more", "most", "some",
    "no", "not", "only", "so", "than", "too", "very", "can", "will", "just",
    "should", "now", "rt", "via",
];

fn base_list(language: &str) -> &'static [&'static str] {
    match language {
        "fa" => PERSIAN_BASE,
        "en" => ENGLISH_BASE,
        _ => &[],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Union of the base list, the optional social-media set (Persian only) and
/// `custom`.  Unknown languages contribute no base words.
pub fn get_stopwords(
    language: &str,
    include_domain_specific: bool,
    custom: Option<&[String]>,
) -> HashSet<String> {
    let mut words: HashSet<String> = base_list(language).iter().map(|w| w.to_string()).collect();
    if include_domain_specific && language == "fa" {
        words.extend(PERSIAN_TWITTER_STOPWORDS.iter().map(|w| w.to_string()));
    }
    if let Some(custom) = custom {
        words.extend(custom.iter().map(|w| w.trim()).filter(|w| !w.is_empty()).map(String::from));
    }
    words
}

/// Full set for `language` extended with `words`.
pub fn add_stopwords<I, S>(language: &str, words: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut set = get_stopwords(language, true, None);
    set.extend(words.into_iter().map(Into::into));
    set
}

/// One word per line; blank lines and lines starting with `#` are ignored.
pub fn load_stopwords_from_file(path: &Path) -> Result<HashSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Write a `# Stopwords list` header and the words in sorted order, creating
/// missing parent directories.
pub fn save_stopwords_to_file(words: &HashSet<String>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let sorted: BTreeSet<&String> = words.iter().collect();
    let mut file = fs::File::create(path)?;
    writeln!(file, "# Stopwords list")?;
    for word in sorted {
        writeln!(file, "{}", word)?;
    }
    Ok(())
}
