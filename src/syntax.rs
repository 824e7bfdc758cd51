//! Dialect-aware path parser and formatter.
//!
//! A [`PathSyntax`] is the pure, connection-free half of a remote path:
//! an optional [`Anchor`] (root, drive, UNC share or EFI volume) followed
//! by an ordered list of segments.  Text only ever enters through
//! [`PathSyntax::parse`], so a stored segment never contains a separator.
//!
//! ```text
//! posix      /home/user/a.txt      anchor "/"              [home, user, a.txt]
//! windows    C:\Users\a.txt        anchor "C:\"            [Users, a.txt]
//! windows    \\srv\share\a.txt     anchor "\\srv\share\"   [a.txt]
//! efi-shell  FS0:\efi\boot         anchor "FS0:\"          [efi, boot]
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::dialect::Dialect;
use crate::errors::{PathError, PathResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The leading, non-segment part of a path.
///
/// `drive` holds `C:`, `\\server\share` or an EFI volume token such as
/// `FS0:`; it is always empty for POSIX.  `root` is set when the path
/// starts at the top of that drive (or of the filesystem).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub drive: String,
    pub root: bool,
}

impl Anchor {
    pub fn is_empty(&self) -> bool {
        self.drive.is_empty() && !self.root
    }
}

/// A parsed path in one dialect, without any connection attached.
#[derive(Debug, Clone)]
pub struct PathSyntax {
    dialect: Dialect,
    anchor: Anchor,
    segments: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl PathSyntax {
    /// Parse `text` under `dialect`'s rules.
    ///
    /// Empty and `.` segments are dropped, repeated and trailing separators
    /// collapse, and `~` is kept as an ordinary segment.
    pub fn parse(dialect: Dialect, text: &str) -> PathResult<Self> {
        let (anchor, rest) = split_anchor(dialect, text);
        let mut segments = Vec::new();
        for part in rest.split(|c| dialect.is_separator(c)) {
            if part.is_empty() || part == "." {
                continue;
            }
            validate_segment(dialect, text, part)?;
            segments.push(part.to_string());
        }
        Ok(Self {
            dialect,
            anchor,
            segments,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path names a location independent of any working
    /// directory.
    pub fn is_absolute(&self) -> bool {
        match self.dialect {
            Dialect::Posix => self.anchor.root,
            Dialect::Windows | Dialect::EfiShell => {
                self.anchor.root && !self.anchor.drive.is_empty()
            }
        }
    }

    /// `true` for the bare root of a drive or filesystem.
    pub fn is_root(&self) -> bool {
        self.anchor.root && self.segments.is_empty()
    }

    /// The `~` or `~user` prefix, if the path starts with one.
    pub(crate) fn tilde_prefix(&self) -> Option<&str> {
        if !self.anchor.is_empty() {
            return None;
        }
        self.segments
            .first()
            .map(String::as_str)
            .filter(|s| s.starts_with('~'))
    }

    /// The relative remainder after the first segment.
    pub(crate) fn without_first_segment(&self) -> PathSyntax {
        PathSyntax {
            dialect: self.dialect,
            anchor: Anchor::default(),
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Formatting
    // -----------------------------------------------------------------------

    fn format_anchor(&self) -> String {
        let mut out = self.anchor.drive.clone();
        if self.anchor.root {
            out.push(self.dialect.separator());
        }
        out
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Join `other` onto this path.
    ///
    /// An absolute `other` replaces the receiver.  On Windows a rooted path
    /// without a drive keeps the receiver's drive, and a different drive
    /// replaces the receiver outright.
    pub fn join(&self, other: &PathSyntax) -> PathSyntax {
        let other_has_drive = !other.anchor.drive.is_empty();
        if other_has_drive && !self.same_drive(&other.anchor.drive) {
            return other.clone();
        }
        if other.anchor.root {
            let drive = if other_has_drive {
                other.anchor.drive.clone()
            } else {
                self.anchor.drive.clone()
            };
            return PathSyntax {
                dialect: self.dialect,
                anchor: Anchor { drive, root: true },
                segments: other.segments.clone(),
            };
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        PathSyntax {
            dialect: self.dialect,
            anchor: self.anchor.clone(),
            segments,
        }
    }

    /// Parse `text` and join it onto this path.
    pub fn join_str(&self, text: &str) -> PathResult<PathSyntax> {
        Ok(self.join(&PathSyntax::parse(self.dialect, text)?))
    }

    /// Append exactly one segment; separators in `name` are rejected.
    pub fn child(&self, name: &str) -> PathResult<PathSyntax> {
        self.check_single_segment(name)?;
        let mut next = self.clone();
        next.segments.push(name.to_string());
        Ok(next)
    }

    /// The logical parent.  The root (and the empty relative path) is its
    /// own parent.
    pub fn parent(&self) -> PathSyntax {
        let mut next = self.clone();
        next.segments.pop();
        next
    }

    /// Every proper ancestor, nearest first.
    pub fn ancestors(&self) -> Vec<PathSyntax> {
        let mut out = Vec::new();
        let mut current = self.clone();
        while !current.segments.is_empty() {
            current = current.parent();
            out.push(current.clone());
        }
        out
    }

    /// Resolve `..` segments lexically.  `..` at the root is dropped; a
    /// relative path keeps its leading `..`.  Symbolic links are ignored,
    /// so this is only sound where the remote has none.
    pub fn normalized(&self) -> PathSyntax {
        let mut segments: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            if segment != ".." {
                segments.push(segment.clone());
                continue;
            }
            if segments.last().is_some_and(|last| last != "..") {
                segments.pop();
            } else if !self.anchor.root {
                segments.push(segment.clone());
            }
        }
        PathSyntax {
            dialect: self.dialect,
            anchor: self.anchor.clone(),
            segments,
        }
    }

    /// The final segment, or `""` for an anchor-only path.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// The final segment's extension including the dot, or `""`.
    pub fn suffix(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(i) if i > 0 && i < name.len() - 1 => &name[i..],
            _ => "",
        }
    }

    /// The final segment without its suffix.
    pub fn stem(&self) -> &str {
        let name = self.name();
        let suffix = self.suffix();
        &name[..name.len() - suffix.len()]
    }

    pub fn with_name(&self, name: &str) -> PathResult<PathSyntax> {
        if self.segments.is_empty() {
            return Err(PathError::invalid_path(
                &self.to_string(),
                "path has an empty name",
            ));
        }
        self.check_single_segment(name)?;
        let mut next = self.clone();
        if let Some(last) = next.segments.last_mut() {
            *last = name.to_string();
        }
        Ok(next)
    }

    /// Replace the suffix; an empty `suffix` removes it.
    pub fn with_suffix(&self, suffix: &str) -> PathResult<PathSyntax> {
        if !suffix.is_empty() && (!suffix.starts_with('.') || suffix == ".") {
            return Err(PathError::invalid_path(suffix, "invalid suffix"));
        }
        let name = format!("{}{suffix}", self.stem());
        self.with_name(&name)
    }

    fn check_single_segment(&self, name: &str) -> PathResult<()> {
        if name.is_empty() || name == "." {
            return Err(PathError::invalid_path(name, "empty segment"));
        }
        if name.chars().any(|c| self.dialect.is_separator(c)) {
            return Err(PathError::invalid_path(name, "segment contains a separator"));
        }
        if self.dialect == Dialect::Windows || self.dialect == Dialect::EfiShell {
            // A lone "C:" would re-parse as a drive.
            if name.ends_with(':') {
                return Err(PathError::invalid_path(name, "segment looks like a drive"));
            }
        }
        validate_segment(self.dialect, name, name)
    }

    // -----------------------------------------------------------------------
    // Comparison
    // -----------------------------------------------------------------------

    fn same_drive(&self, drive: &str) -> bool {
        self.dialect.fold(&self.anchor.drive) == self.dialect.fold(drive)
    }

    fn comparison_key(&self) -> (Dialect, bool, String, Vec<String>) {
        (
            self.dialect,
            self.anchor.root,
            self.dialect.fold(&self.anchor.drive),
            self.segments.iter().map(|s| self.dialect.fold(s)).collect(),
        )
    }
}

impl fmt::Display for PathSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let anchor = self.format_anchor();
        if anchor.is_empty() && self.segments.is_empty() {
            return write!(f, ".");
        }
        let sep = self.dialect.separator().to_string();
        write!(f, "{anchor}{}", self.segments.join(&sep))
    }
}

impl PartialEq for PathSyntax {
    fn eq(&self, other: &Self) -> bool {
        self.comparison_key() == other.comparison_key()
    }
}

impl Eq for PathSyntax {}

impl Hash for PathSyntax {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparison_key().hash(state);
    }
}

impl PartialOrd for PathSyntax {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathSyntax {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparison_key().cmp(&other.comparison_key())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn validate_segment(dialect: Dialect, text: &str, segment: &str) -> PathResult<()> {
    if let Some(c) = segment.chars().find(|&c| dialect.forbidden_in_segment(c)) {
        return Err(PathError::invalid_path(
            text,
            format!("segment {segment:?} contains forbidden character {c:?}"),
        ));
    }
    Ok(())
}

/// Split the anchor off the front of `text`, returning it and the rest.
fn split_anchor(dialect: Dialect, text: &str) -> (Anchor, &str) {
    match dialect {
        Dialect::Posix => match text.strip_prefix('/') {
            Some(rest) => (
                Anchor {
                    drive: String::new(),
                    root: true,
                },
                rest,
            ),
            None => (Anchor::default(), text),
        },
        Dialect::Windows => split_windows_anchor(text),
        Dialect::EfiShell => split_efi_anchor(text),
    }
}

fn split_windows_anchor(text: &str) -> (Anchor, &str) {
    let sep = |c: char| Dialect::Windows.is_separator(c);
    let chars: Vec<char> = text.chars().take(3).collect();

    // UNC: \\server\share\rest
    if chars.len() == 3 && sep(chars[0]) && sep(chars[1]) && !sep(chars[2]) {
        let body = &text[2..];
        let mut parts = body.splitn(3, sep);
        let server = parts.next().unwrap_or("");
        let share = parts.next().unwrap_or("");
        if !server.is_empty() && !share.is_empty() {
            let rest = parts.next().unwrap_or("");
            return (
                Anchor {
                    drive: format!("\\\\{server}\\{share}"),
                    root: true,
                },
                rest,
            );
        }
    }

    // Drive letter: C:, C:\rest or C:rest
    if chars.len() >= 2 && chars[0].is_ascii_alphabetic() && chars[1] == ':' {
        let rest = &text[2..];
        let root = rest.starts_with(sep);
        return (
            Anchor {
                drive: text[..2].to_string(),
                root,
            },
            rest,
        );
    }

    if text.starts_with(sep) {
        return (
            Anchor {
                drive: String::new(),
                root: true,
            },
            text,
        );
    }
    (Anchor::default(), text)
}

fn split_efi_anchor(text: &str) -> (Anchor, &str) {
    let sep = |c: char| Dialect::EfiShell.is_separator(c);
    if let Some(colon) = text.find(':') {
        let volume = &text[..colon];
        let before_sep = !volume.contains(sep);
        let well_formed = !volume.is_empty()
            && volume
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if before_sep && well_formed {
            let rest = &text[colon + 1..];
            return (
                Anchor {
                    drive: text[..=colon].to_string(),
                    root: rest.starts_with(sep),
                },
                rest,
            );
        }
    }
    if text.starts_with(sep) {
        return (
            Anchor {
                drive: String::new(),
                root: true,
            },
            text,
        );
    }
    (Anchor::default(), text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn posix(text: &str) -> PathSyntax {
        PathSyntax::parse(Dialect::Posix, text).unwrap()
    }

    fn win(text: &str) -> PathSyntax {
        PathSyntax::parse(Dialect::Windows, text).unwrap()
    }

    fn efi(text: &str) -> PathSyntax {
        PathSyntax::parse(Dialect::EfiShell, text).unwrap()
    }

    // -- parse: posix --------------------------------------------------------

    #[test]
    fn parse_posix_absolute() {
        let p = posix("/home/user/a.txt");
        assert!(p.anchor().root);
        assert_eq!(p.segments(), ["home", "user", "a.txt"]);
        assert_eq!(p.to_string(), "/home/user/a.txt");
    }

    #[test]
    fn parse_posix_discards_empty_and_dot_segments() {
        assert_eq!(posix("//tmp///./a/").to_string(), "/tmp/a");
        assert_eq!(posix("a/./b/").to_string(), "a/b");
    }

    #[test]
    fn parse_posix_root_keeps_separator() {
        assert_eq!(posix("/").to_string(), "/");
        assert!(posix("/").is_root());
    }

    #[test]
    fn parse_posix_keeps_backslash_in_segment() {
        let p = posix(r"a\b");
        assert_eq!(p.segments(), [r"a\b"]);
    }

    #[test]
    fn parse_empty_is_dot() {
        assert_eq!(posix("").to_string(), ".");
        assert_eq!(win("").to_string(), ".");
    }

    #[test]
    fn parse_keeps_tilde_literal() {
        let p = posix("~/a");
        assert_eq!(p.segments(), ["~", "a"]);
        assert_eq!(p.tilde_prefix(), Some("~"));
        assert_eq!(posix("/~").tilde_prefix(), None);
    }

    #[test]
    fn parse_rejects_nul() {
        let err = PathSyntax::parse(Dialect::Posix, "a\0b").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::InvalidPath);
    }

    // -- parse: windows ------------------------------------------------------

    #[test]
    fn parse_windows_drive_root() {
        let p = win(r"C:\Users\Administrator\Downloads");
        assert_eq!(p.anchor().drive, "C:");
        assert!(p.anchor().root);
        assert!(p.is_absolute());
        assert_eq!(p.to_string(), r"C:\Users\Administrator\Downloads");
    }

    #[test]
    fn parse_windows_forward_slashes() {
        assert_eq!(win("C:/a/b/").to_string(), r"C:\a\b");
    }

    #[test]
    fn parse_windows_drive_relative() {
        let p = win("C:foo");
        assert_eq!(p.anchor().drive, "C:");
        assert!(!p.anchor().root);
        assert!(!p.is_absolute());
        assert_eq!(p.to_string(), "C:foo");
    }

    #[test]
    fn parse_windows_rooted_without_drive() {
        let p = win(r"\temp\x");
        assert!(p.anchor().root);
        assert!(!p.is_absolute());
        assert_eq!(p.to_string(), r"\temp\x");
    }

    #[test]
    fn parse_windows_unc() {
        let p = win(r"\\server\share\dir\f.txt");
        assert_eq!(p.anchor().drive, r"\\server\share");
        assert!(p.is_absolute());
        assert_eq!(p.segments(), ["dir", "f.txt"]);
        assert_eq!(p.to_string(), r"\\server\share\dir\f.txt");
    }

    #[test]
    fn parse_windows_rejects_reserved_characters() {
        for bad in [r"C:\a?b", r"C:\a*b", r"C:\a<b", r#"C:\a"b"#, r"C:\a|b", r"dir\x:y"] {
            assert!(PathSyntax::parse(Dialect::Windows, bad).is_err(), "{bad}");
        }
    }

    // -- parse: efi ----------------------------------------------------------

    #[test]
    fn parse_efi_volume() {
        let p = efi(r"FS0:\efi\boot\");
        assert_eq!(p.anchor().drive, "FS0:");
        assert!(p.anchor().root);
        assert_eq!(p.segments(), ["efi", "boot"]);
        assert_eq!(p.to_string(), r"FS0:\efi\boot");
    }

    #[test]
    fn parse_efi_volume_only() {
        let p = efi("fs1:");
        assert_eq!(p.anchor().drive, "fs1:");
        assert!(!p.anchor().root);
        assert_eq!(p.to_string(), "fs1:");
    }

    #[test]
    fn parse_efi_relative() {
        let p = efi(r"a\b");
        assert!(p.anchor().is_empty());
        assert_eq!(p.to_string(), r"a\b");
    }

    // -- round trip ----------------------------------------------------------

    #[test]
    fn reparse_is_idempotent() {
        let cases: &[(Dialect, &str)] = &[
            (Dialect::Posix, "/tmp//a/./b/"),
            (Dialect::Posix, "rel/../x"),
            (Dialect::Posix, "~user/.config"),
            (Dialect::Windows, "C:/Users//me/"),
            (Dialect::Windows, r"\\srv\share"),
            (Dialect::Windows, "d:relative"),
            (Dialect::Windows, r"\rooted\x"),
            (Dialect::EfiShell, r"FS0:\EFI\BOOT\bootx64.efi"),
            (Dialect::EfiShell, "fs2:/a/b"),
            (Dialect::EfiShell, ""),
        ];
        for &(dialect, text) in cases {
            let once = PathSyntax::parse(dialect, text).unwrap();
            let formatted = once.to_string();
            let twice = PathSyntax::parse(dialect, &formatted).unwrap();
            assert_eq!(once, twice, "{dialect} {text}");
            assert_eq!(formatted, twice.to_string(), "{dialect} {text}");
        }
    }

    // -- equality ------------------------------------------------------------

    #[test]
    fn posix_equality_is_case_sensitive() {
        assert_ne!(posix("/tmp/A"), posix("/tmp/a"));
        assert_eq!(posix("/tmp/a/"), posix("/tmp//a"));
    }

    #[test]
    fn windows_equality_is_case_insensitive() {
        assert_eq!(win(r"C:\Users\A"), win("c:/users/a"));
        assert_ne!(win(r"C:\Users\A"), win(r"D:\Users\A"));
    }

    #[test]
    fn efi_equality_is_case_insensitive() {
        assert_eq!(efi(r"FS0:\EFI"), efi(r"fs0:\efi"));
    }

    #[test]
    fn different_dialects_are_never_equal() {
        assert_ne!(posix("a"), win("a"));
    }

    #[test]
    fn ordering_agrees_with_equality() {
        assert_eq!(win("C:/A").cmp(&win("c:/a")), Ordering::Equal);
        assert!(posix("/a") < posix("/b"));
    }

    // -- join ----------------------------------------------------------------

    #[test]
    fn join_relative_appends() {
        assert_eq!(posix("/tmp").join_str("a/b").unwrap().to_string(), "/tmp/a/b");
    }

    #[test]
    fn join_absolute_replaces() {
        assert_eq!(posix("/tmp").join_str("/etc").unwrap().to_string(), "/etc");
    }

    #[test]
    fn join_windows_rooted_keeps_drive() {
        assert_eq!(win(r"C:\a").join_str(r"\b").unwrap().to_string(), r"C:\b");
    }

    #[test]
    fn join_windows_other_drive_replaces() {
        assert_eq!(win(r"C:\a").join_str(r"D:\b").unwrap().to_string(), r"D:\b");
        assert_eq!(win(r"C:\a").join_str("D:b").unwrap().to_string(), "D:b");
    }

    #[test]
    fn join_windows_same_drive_relative_appends() {
        assert_eq!(win(r"C:\a").join_str("c:b").unwrap().to_string(), r"C:\a\b");
    }

    // -- navigation ----------------------------------------------------------

    #[test]
    fn child_rejects_separators() {
        assert!(posix("/tmp").child("a/b").is_err());
        assert!(win(r"C:\tmp").child("a/b").is_err());
        assert!(win(r"C:\tmp").child(r"a\b").is_err());
        assert!(posix("/tmp").child("").is_err());
        assert_eq!(posix("/tmp").child(r"a\b").unwrap().to_string(), r"/tmp/a\b");
    }

    #[test]
    fn parent_of_root_is_root() {
        assert_eq!(posix("/").parent().to_string(), "/");
        assert_eq!(posix("/a/b").parent().to_string(), "/a");
        assert_eq!(win(r"C:\a").parent().to_string(), r"C:\");
    }

    #[test]
    fn ancestors_nearest_first() {
        let names: Vec<String> = posix("/a/b/c")
            .ancestors()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["/a/b", "/a", "/"]);
    }

    #[test]
    fn name_suffix_stem() {
        let p = posix("/tmp/archive.tar.gz");
        assert_eq!(p.name(), "archive.tar.gz");
        assert_eq!(p.suffix(), ".gz");
        assert_eq!(p.stem(), "archive.tar");
        assert_eq!(posix("/tmp/.bashrc").suffix(), "");
        assert_eq!(posix("/").name(), "");
    }

    #[test]
    fn with_suffix_and_name() {
        let p = posix("/tmp/a.txt");
        assert_eq!(p.with_suffix(".log").unwrap().to_string(), "/tmp/a.log");
        assert_eq!(p.with_suffix("").unwrap().to_string(), "/tmp/a");
        assert_eq!(p.with_name("b").unwrap().to_string(), "/tmp/b");
        assert!(p.with_suffix("log").is_err());
        assert!(posix("/").with_name("x").is_err());
    }

    #[test]
    fn windows_child_rejects_drive_like_names() {
        assert!(win(r"C:\a").child("D:").is_err());
    }

    #[test]
    fn normalized_resolves_parent_segments() {
        assert_eq!(efi(r"FS0:\a\..\b").normalized(), efi(r"FS0:\B"));
        assert_eq!(efi(r"FS0:\..\b").normalized(), efi(r"FS0:\b"));
        assert_eq!(posix("../a/../../b").normalized().to_string(), "../../b");
        assert_eq!(win(r"C:\x\y\..").normalized().to_string(), r"C:\x");
    }
}
