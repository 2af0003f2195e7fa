//! Source text normalization.
//!
//! Formatting whitespace inside `<para>`, `<entry>` and `<term>` and after
//! `</programlisting>` ends up in rendered text, so it is removed from every
//! XML file of the working copy before transformation. The rules are plain
//! text substitutions applied in a fixed order.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let ws = r"[ \t\n\x0B\x0C\r]";
    let mut rules = vec![(r"\r\n".to_owned(), "\n"), (r"\r".to_owned(), "\n")];
    rules.extend([
        (format!(r"<para(?:>| [^>^/]*>){ws}*\n{ws}*"), "<para>"),
        ("</ para>".to_owned(), "</para>"),
        (format!(r"\n{ws}*</para>"), "</para>"),
        ("</ programlisting>".to_owned(), "</programlisting>"),
        (format!(r"</programlisting>\n{ws}*"), "</programlisting>"),
        (format!(r"<entry(?:>| [^>^/]*>){ws}*\n{ws}*"), "<entry>"),
        ("</ entry>".to_owned(), "</entry>"),
        (format!(r"\n{ws}*</entry>"), "</entry>"),
        (format!(r"<term(?:>| [^>^/]*>){ws}*\n{ws}*"), "<term>"),
        ("</ term>".to_owned(), "</term>"),
        (format!(r"\n{ws}*</term>"), "</term>"),
    ]);
    rules
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(&pattern).unwrap(), replacement))
        .collect()
});

/// Apply the normalization rules to XML text.
pub fn normalize_content(content: &str) -> String {
    RULES
        .iter()
        .fold(content.to_owned(), |text, (rule, replacement)| {
            rule.replace_all(&text, *replacement).into_owned()
        })
}

/// Normalize one file in place.
pub fn normalize_file(path: &Path) -> io::Result<()> {
    let content = fs::read_to_string(path)?;
    let normalized = normalize_content(&content);
    if normalized != content {
        fs::write(path, normalized)?;
    }
    Ok(())
}

/// Normalize every `*.xml` file below `dir`, recursively.
///
/// Returns the number of files processed.
pub fn normalize_dir(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += normalize_dir(&path)?;
        } else if is_xml_file(&path) {
            debug!(path = %path.display(), "normalizing");
            normalize_file(&path)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Whether `path` names an XML file (case-insensitive `.xml` extension).
pub(crate) fn is_xml_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_para_normalization() {
        let cases = [
            ("<para>text</para>", "<para>text</para>"),
            ("<para>\ntext</para>", "<para>text</para>"),
            ("<para>\n     text</para>", "<para>text</para>"),
            ("<para>    \n     text</para>", "<para>text</para>"),
            ("<para attr=\"cosi\">\ntext</para>", "<para>text</para>"),
            ("<para>text\n</para>", "<para>text</para>"),
            ("<para>\ntext      \n</para>", "<para>text      </para>"),
            ("<para>\n     text\n     </para>", "<para>text</para>"),
            ("<para>\n     text\n     </ para>", "<para>text</para>"),
            (
                "<para>\n     text\n     </para>\n<para>\n     text2\n     </para>",
                "<para>text</para>\n<para>text2</para>",
            ),
            (
                "<para>\n     text <strong>strongtext</strong> text\n     </para>\n<para>\n     text2\n     </para>",
                "<para>text <strong>strongtext</strong> text</para>\n<para>text2</para>",
            ),
            ("<para>\r\n     text\r\n     </ para>", "<para>text</para>"),
            ("<para>\r     text\r     </ para>", "<para>text</para>"),
            ("text <para />\n test", "text <para />\n test"),
            ("text <para/>\n test", "text <para/>\n test"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_content(input), expected, "{input:?}");
        }
    }

    #[test]
    fn test_programlisting_entry_term_normalization() {
        assert_eq!(
            normalize_content(
                "<programlisting>text</programlisting>\n  text1a\n<programlisting>\n  text2\n     </ programlisting>\n   text2a"
            ),
            "<programlisting>text</programlisting>text1a\n<programlisting>\n  text2\n     </programlisting>text2a"
        );
        assert_eq!(
            normalize_content("<entry>\n     text\n     </entry>\n<entry>\n     text2\n     </ entry>"),
            "<entry>text</entry>\n<entry>text2</entry>"
        );
        assert_eq!(
            normalize_content(
                "<entry align=\"center\">\n XML Book Component</entry>\n            <entry align=\"center\">Description</entry>"
            ),
            "<entry>XML Book Component</entry>\n            <entry align=\"center\">Description</entry>"
        );
        assert_eq!(normalize_content("text <entry/>\n test"), "text <entry/>\n test");
        assert_eq!(
            normalize_content("  <term>text2</term>\n   <term>\n     text\n     </term>\n<term>\n     text2\n     </ term>"),
            "  <term>text2</term>\n   <term>text</term>\n<term>text2</term>"
        );
        assert_eq!(normalize_content("text <term />\n test"), "text <term />\n test");
    }

    #[test]
    fn test_normalize_dir_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("en-US");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("Book.XML"), "<para>\n     text\n     </ para>").unwrap();
        fs::write(nested.join("chapter.xml"), "<term>\n a</term>").unwrap();
        fs::write(nested.join("notes.txt"), "<para>\n x</para>").unwrap();

        assert_eq!(normalize_dir(dir.path()).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("Book.XML")).unwrap(),
            "<para>text</para>"
        );
        assert_eq!(
            fs::read_to_string(nested.join("chapter.xml")).unwrap(),
            "<term>a</term>"
        );
        assert_eq!(
            fs::read_to_string(nested.join("notes.txt")).unwrap(),
            "<para>\n x</para>"
        );
    }
}
