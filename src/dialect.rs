//! Dialect tags and their syntax rules.
//!
//! A [`Dialect`] is fixed once per connection.  Everything that depends on
//! "which kind of remote is this" (separators, case folding, quoting,
//! newline convention) is answered here so the parser and the translator
//! never branch on strings.

use std::fmt;

use serde::Deserialize;

/// The three remote path dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Posix,
    Windows,
    #[serde(alias = "efishell", alias = "efi")]
    EfiShell,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Posix => write!(f, "posix"),
            Dialect::Windows => write!(f, "windows"),
            Dialect::EfiShell => write!(f, "efi-shell"),
        }
    }
}

impl Dialect {
    /// Separator used when formatting.
    pub fn separator(self) -> char {
        match self {
            Dialect::Posix => '/',
            Dialect::Windows | Dialect::EfiShell => '\\',
        }
    }

    /// Whether `c` splits segments when parsing.
    pub fn is_separator(self, c: char) -> bool {
        match self {
            Dialect::Posix => c == '/',
            Dialect::Windows | Dialect::EfiShell => c == '/' || c == '\\',
        }
    }

    /// Windows and EFI-shell compare names without regard to case.
    pub fn is_case_insensitive(self) -> bool {
        !matches!(self, Dialect::Posix)
    }

    /// Fold a name for comparison under this dialect's case rule.
    pub fn fold(self, s: &str) -> String {
        if self.is_case_insensitive() {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    }

    /// The line terminator files on this dialect use natively.
    pub fn native_newline(self) -> &'static str {
        match self {
            Dialect::Posix => "\n",
            Dialect::Windows | Dialect::EfiShell => "\r\n",
        }
    }

    /// Characters that may never appear inside a single segment.
    pub(crate) fn forbidden_in_segment(self, c: char) -> bool {
        if c == '\0' {
            return true;
        }
        match self {
            Dialect::Posix => false,
            Dialect::Windows => {
                c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*')
            }
            Dialect::EfiShell => c.is_control() || c == '"',
        }
    }

    /// Quote a formatted path for embedding in this dialect's command line.
    pub fn quote(self, s: &str) -> String {
        match self {
            Dialect::Posix => shell_escape(s),
            Dialect::Windows => powershell_literal(s),
            // Segments never contain '"', so plain double quotes suffice.
            Dialect::EfiShell => format!("\"{s}\""),
        }
    }
}

/// Shell-escape a string for safe embedding in `sh -c '…'` commands.
pub(crate) fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Render `s` as a single-quoted PowerShell literal.
pub(crate) fn powershell_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
