//! Supported DocBook source dialects.

use std::fmt;
use std::str::FromStr;

/// DocBook dialect of the source document.
///
/// Dialects differ in the element namespace (and therefore the prefix used in
/// structural paths) and in the postfix selecting their transform programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// DocBook 4.x, elements without namespace.
    #[default]
    DocBook43,
    /// DocBook 5.0, elements in the DocBook namespace.
    DocBook50,
}

impl Dialect {
    /// Namespace prefix used when building structural paths.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::DocBook43 => "",
            Self::DocBook50 => "d:",
        }
    }

    /// Postfix appended to program names.
    pub fn postfix(self) -> &'static str {
        match self {
            Self::DocBook43 => "_4_3",
            Self::DocBook50 => "_5_0",
        }
    }

    /// Element namespace, `None` for DocBook 4.x.
    pub fn namespace(self) -> Option<&'static str> {
        match self {
            Self::DocBook43 => None,
            Self::DocBook50 => Some("http://docbook.org/ns/docbook"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DocBook43 => "4.3",
            Self::DocBook50 => "5.0",
        })
    }
}

/// Unknown dialect keyword.
#[derive(Debug, thiserror::Error)]
#[error("unknown DocBook dialect {0:?} (expected 4.3 or 5.0)")]
pub struct UnknownDialect(String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "4" | "4.3" => Ok(Self::DocBook43),
            "5" | "5.0" => Ok(Self::DocBook50),
            other => Err(UnknownDialect(other.to_owned())),
        }
    }
}
