//! Named character entities.
//!
//! DocBook 4 documents use ISO entity names declared by the external DTD.
//! When that DTD is not loaded, references are resolved from this table.

use std::sync::LazyLock;

use regex::Regex;

/// Entity or character reference inside text.
pub(super) static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[A-Za-z_:][\w.:\-]*);").unwrap());

/// Map a named entity to its Unicode text.
pub fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        // Common entities
        "nbsp" => "\u{00a0}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "bdquo" => "\u{201e}",
        "bull" => "\u{2022}",
        "hellip" => "\u{2026}",
        "shy" => "\u{00ad}",
        "thinsp" => "\u{2009}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",

        // Arrows
        "rarr" => "\u{2192}",
        "larr" => "\u{2190}",
        "harr" => "\u{2194}",
        "uarr" => "\u{2191}",
        "darr" => "\u{2193}",
        "rArr" => "\u{21d2}",
        "lArr" => "\u{21d0}",

        // Math symbols
        "le" => "\u{2264}",
        "ge" => "\u{2265}",
        "ne" => "\u{2260}",
        "plusmn" => "\u{00b1}",
        "times" => "\u{00d7}",
        "divide" => "\u{00f7}",
        "minus" => "\u{2212}",
        "infin" => "\u{221e}",

        // Legal symbols
        "copy" => "\u{00a9}",
        "reg" => "\u{00ae}",
        "trade" => "\u{2122}",

        // Currency
        "euro" => "\u{20ac}",
        "pound" => "\u{00a3}",
        "yen" => "\u{00a5}",
        "cent" => "\u{00a2}",
        "dollar" => "$",

        // ISO numeric and punctuation names used by DocBook
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "num" => "#",
        "percnt" => "%",
        "ast" => "*",
        "commat" => "@",
        "lsqb" => "[",
        "rsqb" => "]",
        "lcub" => "{",
        "rcub" => "}",
        "verbar" => "|",
        "lowbar" => "_",
        "sol" => "/",
        "bsol" => "\\",

        // Misc symbols
        "deg" => "\u{00b0}",
        "para" => "\u{00b6}",
        "sect" => "\u{00a7}",
        "dagger" => "\u{2020}",
        "Dagger" => "\u{2021}",
        "laquo" => "\u{00ab}",
        "raquo" => "\u{00bb}",
        "iexcl" => "\u{00a1}",
        "iquest" => "\u{00bf}",
        "check" => "\u{2713}",

        // Fractions
        "frac14" => "\u{00bc}",
        "frac12" => "\u{00bd}",
        "frac34" => "\u{00be}",

        // Superscripts
        "sup1" => "\u{00b9}",
        "sup2" => "\u{00b2}",
        "sup3" => "\u{00b3}",

        // Other
        "acute" => "\u{00b4}",
        "micro" => "\u{00b5}",
        "middot" => "\u{00b7}",
        "cedil" => "\u{00b8}",
        "ordf" => "\u{00aa}",
        "ordm" => "\u{00ba}",

        // Unknown entity
        _ => return None,
    })
}

/// Character for a numeric reference body such as `#233` or `#xE9`.
pub(super) fn char_reference(body: &str) -> Option<char> {
    let code = if let Some(hex) = body
        .strip_prefix("#x")
        .or_else(|| body.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        body.strip_prefix('#')?.parse::<u32>().ok()
    };
    code.and_then(char::from_u32)
}

/// Expand numeric character references only; named references stay.
pub(super) fn expand_char_references(text: &str) -> String {
    if !text.contains("&#") {
        return text.to_owned();
    }
    REFERENCE_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            char_reference(&caps[1]).map_or_else(|| caps[0].to_owned(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_entity_lookup() {
        assert_eq!(html_entity("nbsp"), Some("\u{00a0}"));
        assert_eq!(html_entity("mdash"), Some("\u{2014}"));
        assert_eq!(html_entity("unknown"), None);
    }

    #[test]
    fn test_char_reference() {
        assert_eq!(char_reference("#233"), Some('\u{e9}'));
        assert_eq!(char_reference("#xE9"), Some('\u{e9}'));
        assert_eq!(char_reference("#X2014"), Some('\u{2014}'));
        assert_eq!(char_reference("#xZZ"), None);
        assert_eq!(char_reference("copy"), None);
    }

    #[test]
    fn test_expand_char_references_keeps_named() {
        assert_eq!(
            expand_char_references("a&#x2014;b &product; &#169;"),
            "a\u{2014}b &product; \u{a9}"
        );
    }
}
