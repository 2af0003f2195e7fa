//! Wiki markup escaping helpers.
//!
//! Pure text functions used by the wiki renderer. Whitespace classes follow
//! the ASCII set (`[ \t\n\x0B\x0C\r]`), not Unicode whitespace, so markup
//! around non-breaking spaces is left alone.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static SECTION_TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9]{1,3}-.+$").unwrap());

/// Start of a pair tag (bold, emphasis, underline, strike, link, emoticon, macro).
static PAIR_TAG_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*\-+_\[({][^ \t\n\x0B\x0C\r]").unwrap());

static LEADING_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\n\x0B\x0C\r]*\*[ \t\n\x0B\x0C\r]+").unwrap());

static LEADING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\n\x0B\x0C\r]*-[ \t\n\x0B\x0C\r]+").unwrap());

static LEADING_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\n\x0B\x0C\r]*#[ \t\n\x0B\x0C\r]+").unwrap());

/// Line break collapsing rules, applied in order.
static EOL_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[ \t\n\x0B\x0C\r]+\n[ \t\n\x0B\x0C\r]+",
        r"[ \t\n\x0B\x0C\r]+\n",
        r"\n[ \t\n\x0B\x0C\r]+",
        r"[ \t\n\x0B\x0C\r]+\r[ \t\n\x0B\x0C\r]+",
        r"[ \t\n\x0B\x0C\r]+\r",
        r"\r[ \t\n\x0B\x0C\r]+",
        r"[\n\r]",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Remove a uniqueness prefix (`AB-`, `ABC-`, `ABCD-`) from a section title.
///
/// The prefix is two to four letters or digits followed by `-`; whitespace
/// after it is trimmed. Titles without such a prefix are returned unchanged.
pub fn section_title_prefix_remove(title: &str) -> String {
    if !SECTION_TITLE_PREFIX.is_match(title) {
        return title.to_owned();
    }
    match title.split_once('-') {
        Some((_, rest)) => trim_control(rest).to_owned(),
        None => title.to_owned(),
    }
}

/// Escape characters that would start wiki markup and collapse line breaks.
pub fn escape_wiki_chars_in_content(text: &str) -> String {
    let text = PAIR_TAG_START.replace_all(text, |caps: &Captures<'_>| format!("\\{}", &caps[0]));
    let text = LEADING_BULLET.replace(&text, r"\* ");
    let text = LEADING_DASH.replace(&text, r"\- ");
    let text = LEADING_HASH.replace(&text, r"\# ");
    remove_all_eol(&text)
}

/// Render text as monospaced (`{{text}}`), keeping one outer space per side.
pub fn prepare_monospaced_wiki_text(text: &str) -> String {
    surround_wiki_content_text(text, "{{", "}}")
}

/// Escape `text` and wrap it in `prefix`/`suffix`.
///
/// A leading space and a trailing space of the original text are kept
/// outside the wrapper. Blank text yields only the kept spaces.
pub fn surround_wiki_content_text(text: &str, prefix: &str, suffix: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(text.len() + prefix.len() + suffix.len());
    if text.starts_with(' ') {
        out.push(' ');
    }
    let inner = trim_control(text);
    if !inner.is_empty() {
        out.push_str(prefix);
        out.push_str(&escape_wiki_chars_in_content(inner));
        out.push_str(suffix);
    }
    if text.len() > 1 && text.ends_with(' ') {
        out.push(' ');
    }
    out
}

/// Trim indentation introduced by XML formatting and collapse line breaks.
///
/// Leading whitespace is dropped only when the text starts with a line break;
/// trailing whitespace only when it follows the last line break.
pub fn trim_wiki_text(text: &str) -> String {
    remove_all_eol(trim_trailing_break(trim_leading_break(text)))
}

/// Drop leading whitespace if the text starts with a line break.
pub fn trim_leading_break(text: &str) -> &str {
    if text.starts_with('\n') {
        text.trim_start_matches(is_xml_whitespace)
    } else {
        text
    }
}

/// Drop the last line break and what follows it, if only whitespace does.
pub fn trim_trailing_break(text: &str) -> &str {
    let end = text.trim_end_matches(is_xml_whitespace).len();
    match text[end..].rfind('\n') {
        Some(idx) => &text[..end + idx],
        None => text,
    }
}

/// Replace every line break (with surrounding whitespace) by a single space.
pub fn remove_all_eol(text: &str) -> String {
    let mut text = text.to_owned();
    for rule in EOL_RULES.iter() {
        if rule.is_match(&text) {
            text = rule.replace_all(&text, " ").into_owned();
        }
    }
    text
}

/// Trim ASCII control characters and spaces from both ends.
fn trim_control(text: &str) -> &str {
    text.trim_matches(|c: char| c <= ' ')
}

fn is_xml_whitespace(c: char) -> bool {
    c.is_whitespace() && !matches!(c, '\u{00A0}' | '\u{2007}' | '\u{202F}')
}
