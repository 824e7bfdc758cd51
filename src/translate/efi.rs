//! UEFI shell commands and output parsing.
//!
//! The shell has no exit-status discipline worth trusting and echoes its
//! prompt after every command, so output is cleaned before it is read and
//! errors are recognised from the text as well as from the status.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::classify;
use crate::connection::ExecResult;
use crate::dialect::Dialect;
use crate::errors::PathResult;
use crate::syntax::PathSyntax;

fn quoted(path: &PathSyntax) -> String {
    Dialect::EfiShell.quote(&path.to_string())
}

pub(super) fn ls(path: &PathSyntax) -> String {
    format!("ls {}", quoted(path))
}

pub(super) fn mkdir(path: &PathSyntax) -> String {
    format!("mkdir {}", quoted(path))
}

/// `rm` is recursive on the shell; callers check for emptiness first.
pub(super) fn rm(path: &PathSyntax) -> String {
    format!("rm -q {}", quoted(path))
}

pub(super) fn mv(src: &PathSyntax, dst: &PathSyntax) -> String {
    format!("mv {} {}", quoted(src), quoted(dst))
}

pub(super) fn attrib(path: &PathSyntax, readonly: bool) -> String {
    let flag = if readonly { "+r" } else { "-r" };
    format!("attrib {flag} {}", quoted(path))
}

pub(super) const CD: &str = "cd";

static RENAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unused sibling of `path` for a two-step rename.
pub(super) fn temporary_sibling(path: &PathSyntax) -> PathResult<PathSyntax> {
    let n = RENAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.parent()
        .child(&format!("{}.remote-path-{}-{n}", path.name(), std::process::id()))
}

// ---------------------------------------------------------------------------
// Output handling
// ---------------------------------------------------------------------------

/// Whether `line` is a shell prompt such as `Shell>`, `FS0:\>` or `FS0:`.
fn is_prompt(line: &str) -> bool {
    let line = line.trim();
    if line.eq_ignore_ascii_case("shell>") {
        return true;
    }
    // Without `>` only a bare volume counts, so `cd` output survives.
    let (body, has_marker) = match line.strip_suffix('>') {
        Some(body) => (body, true),
        None => (line, false),
    };
    let Some(idx) = body.find(':') else {
        return false;
    };
    let (volume, rest) = body.split_at(idx);
    !volume.is_empty()
        && volume
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !rest.contains(' ')
        && (rest.len() == 1 || (has_marker && rest[1..].starts_with('\\')))
}

/// Output text with trailing blank lines and prompts removed.
pub(super) fn clean_output(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    while let Some(last) = lines.last() {
        if last.trim().is_empty() || is_prompt(last) {
            lines.pop();
        } else {
            break;
        }
    }
    lines.join("\n")
}

/// `ls` reports a missing operand as `ls: File Not Found - '<path>'`.
pub(super) fn is_missing(output: &str) -> bool {
    classify::efi_diagnostics(output).any(|line| line.to_lowercase().contains("not found"))
}

/// A failure either by status or by one of the shell's error strings.
pub(super) fn failed(result: &ExecResult) -> bool {
    !result.success() || classify::efi_reports_error(&result.stdout_text())
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Entry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Listing {
    /// Text after `Directory of:`.
    pub header: Option<String>,
    pub entries: Vec<Entry>,
}

/// Parse `ls` output.
///
/// Entry lines look like `09/23/2019 11:32 [<DIR>] [attrs] 4,953,056 name`.
/// Summary lines (`1 File(s) ...`) and anything else are skipped.
pub(super) fn parse_listing(output: &str) -> Listing {
    let mut listing = Listing::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Directory of:") {
            listing.header = Some(rest.trim().to_string());
            continue;
        }
        if let Some(entry) = parse_entry(line) {
            listing.entries.push(entry);
        }
    }
    listing
}

fn parse_entry(line: &str) -> Option<Entry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 || !tokens[0].contains('/') || !tokens[1].contains(':') {
        return None;
    }
    let mut is_dir = false;
    let mut idx = 2;
    while idx < tokens.len() {
        let token = tokens[idx];
        if token.eq_ignore_ascii_case("<DIR>") {
            is_dir = true;
        } else if token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic()) {
            // attribute flag
        } else if token.chars().all(|c| c.is_ascii_digit() || c == ',') {
            idx += 1;
            break;
        } else {
            return None;
        }
        idx += 1;
    }
    if idx >= tokens.len() {
        return None;
    }
    Some(Entry {
        name: tokens[idx..].join(" "),
        is_dir,
    })
}

impl Listing {
    /// Whether this listing shows `path` as a directory rather than as a
    /// single file inside its parent.
    pub(super) fn describes_directory(&self, path: &PathSyntax) -> bool {
        if path.is_root() {
            return true;
        }
        if self.entries.iter().any(|e| e.is_dir && e.name == ".") {
            return true;
        }
        let name = Dialect::EfiShell.fold(path.name());
        let header_names_path = self.header.as_deref().is_some_and(|h| {
            let last = h
                .trim_end_matches('\\')
                .rsplit(['\\', ':'])
                .next()
                .unwrap_or("");
            Dialect::EfiShell.fold(last) == name
        });
        let file_entry = self
            .entries
            .iter()
            .any(|e| !e.is_dir && Dialect::EfiShell.fold(&e.name) == name);
        header_names_path && !file_entry
    }

    /// Entries other than `.` and `..`.
    pub(super) fn children(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.name != "." && e.name != "..")
    }
}

/// The shell's current directory from `cd` output.
pub(super) fn parse_cwd(output: &str) -> PathResult<PathSyntax> {
    let cwd = clean_output(output);
    let line = cwd.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    PathSyntax::parse(Dialect::EfiShell, line)
}
