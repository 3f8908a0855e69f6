//! Emoji detection over Unicode emoji properties.
//!
//! A pictograph is any `Extended_Pictographic` or `Regional_Indicator`
//! codepoint.  Presentation components (variation selector 16, skin-tone
//! modifiers, the keycap combiner, tag characters) are reported separately:
//! they are stripped together with emoji but never extracted as emoji of
//! their own.
//!
//! | Sequence                     | Example  | Stripped as |
//! |------------------------------|----------|-------------|
//! | Pictograph + components      | 👍🏽       | one unit    |
//! | ZWJ sequence                 | 👨‍👩‍👧      | one unit    |
//! | Keycap                       | 1️⃣       | one unit    |
//! | Flag (regional indicators)   | 🇮🇷       | one unit    |
//!
//! The zero-width joiner only goes when it joins two pictographs: it is also
//! a Persian orthographic character.

use once_cell::sync::Lazy;
use regex::Regex;

const PICTOGRAPH: &str = r"[\p{Extended_Pictographic}\p{Regional_Indicator}]";
const COMPONENT: &str = r"[\x{FE0F}\x{20E3}\p{Emoji_Modifier}\x{E0020}-\x{E007F}]";

static PICTOGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{}$", PICTOGRAPH)).unwrap());

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{}$", COMPONENT)).unwrap());

/// Whole emoji sequences plus stray components.
static SEQUENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"[0-9#*]\x{{FE0F}}?\x{{20E3}}|{p}{c}*(?:\x{{200D}}{p}{c}*)*|{c}+",
        p = PICTOGRAPH,
        c = COMPONENT,
    ))
    .unwrap()
});

fn matches_char(re: &Regex, c: char) -> bool {
    let mut buf = [0u8; 4];
    re.is_match(c.encode_utf8(&mut buf))
}

/// Presentation component (skin tone, VS16, keycap, tag).
pub fn is_emoji_component(c: char) -> bool {
    matches_char(&COMPONENT_RE, c)
}

/// Whether `c` is an emoji pictograph.  Components are not.
pub fn is_emoji(c: char) -> bool {
    !is_emoji_component(c) && matches_char(&PICTOGRAPH_RE, c)
}

/// Emoji pictographs of `text` in order of appearance.
pub fn extract(text: &str) -> Vec<String> {
    text.chars().filter(|&c| is_emoji(c)).map(String::from).collect()
}

/// Remove emoji sequences and stray components.
///
/// With `preserve_length` each removed character becomes one space, so the
/// character count is unchanged.
pub fn strip(text: &str, preserve_length: bool) -> String {
    SEQUENCE_RE
        .replace_all(text, |caps: &regex::Captures| {
            if preserve_length {
                " ".repeat(caps[0].chars().count())
            } else {
                String::new()
            }
        })
        .into_owned()
}
