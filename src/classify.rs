//! Error classifier.
//!
//! Maps a failed remote invocation (exit status plus stderr/stdout text)
//! onto the shared [`PathError`] taxonomy.  Each dialect has its own ordered
//! pattern table; the first match wins.  Anything unrecognised becomes
//! [`PathError::RemoteOperationFailed`] with the raw diagnostic attached.

use tracing::trace;

use crate::connection::ExecResult;
use crate::dialect::Dialect;
use crate::errors::{ErrorKind, PathError};

// ---------------------------------------------------------------------------
// Pattern tables
// ---------------------------------------------------------------------------

/// coreutils, busybox, dash and iconv messages.  Matched
/// case-insensitively.
const POSIX_PATTERNS: &[(&str, ErrorKind)] = &[
    ("no such file or directory", ErrorKind::NotFound),
    ("directory nonexistent", ErrorKind::NotFound),
    ("cannot access", ErrorKind::NotFound),
    ("file exists", ErrorKind::AlreadyExists),
    ("cannot overwrite existing file", ErrorKind::AlreadyExists),
    ("not a directory", ErrorKind::NotADirectory),
    ("directory not empty", ErrorKind::NotEmpty),
    ("is a directory", ErrorKind::NotAFile),
    ("permission denied", ErrorKind::PermissionDenied),
    ("operation not permitted", ErrorKind::PermissionDenied),
    ("read-only file system", ErrorKind::PermissionDenied),
    ("cannot convert", ErrorKind::InvalidData),
    ("conversion from", ErrorKind::InvalidData),
    ("illegal input sequence", ErrorKind::InvalidData),
    ("invalid input sequence", ErrorKind::InvalidData),
    ("incomplete character", ErrorKind::InvalidData),
];

/// .NET exception type names emitted by the PowerShell scripts.
const WINDOWS_TYPES: &[(&str, ErrorKind)] = &[
    ("FileNotFoundException", ErrorKind::NotFound),
    ("DirectoryNotFoundException", ErrorKind::NotFound),
    ("ItemNotFoundException", ErrorKind::NotFound),
    ("UnauthorizedAccessException", ErrorKind::PermissionDenied),
    ("DecoderFallbackException", ErrorKind::InvalidData),
    ("EncoderFallbackException", ErrorKind::InvalidData),
];

/// Win32 error codes carried in the low word of an `0x8007xxxx` HRESULT.
const WIN32_CODES: &[(u32, ErrorKind)] = &[
    (2, ErrorKind::NotFound),
    (3, ErrorKind::NotFound),
    (5, ErrorKind::PermissionDenied),
    (19, ErrorKind::PermissionDenied),
    (80, ErrorKind::AlreadyExists),
    (145, ErrorKind::NotEmpty),
    (183, ErrorKind::AlreadyExists),
    (267, ErrorKind::NotADirectory),
];

/// Message fallbacks for output that did not come from our own scripts.
const WINDOWS_MESSAGES: &[(&str, ErrorKind)] = &[
    ("could not find", ErrorKind::NotFound),
    ("cannot find", ErrorKind::NotFound),
    ("does not exist", ErrorKind::NotFound),
    ("already exists", ErrorKind::AlreadyExists),
    ("directory is not empty", ErrorKind::NotEmpty),
    ("directory name is invalid", ErrorKind::NotADirectory),
    ("access to the path", ErrorKind::PermissionDenied),
    ("access is denied", ErrorKind::PermissionDenied),
];

/// UEFI shell status strings.
const EFI_PATTERNS: &[(&str, ErrorKind)] = &[
    ("directory not empty", ErrorKind::NotEmpty),
    ("not a directory", ErrorKind::NotADirectory),
    ("not found", ErrorKind::NotFound),
    ("already exists", ErrorKind::AlreadyExists),
    ("access denied", ErrorKind::PermissionDenied),
    ("write protected", ErrorKind::PermissionDenied),
];

/// SFTP and generic transport phrases.
const TRANSPORT_PATTERNS: &[(&str, ErrorKind)] = &[
    ("ssh_fx_no_such_file", ErrorKind::NotFound),
    ("no such file", ErrorKind::NotFound),
    ("not found", ErrorKind::NotFound),
    ("does not exist", ErrorKind::NotFound),
    ("ssh_fx_permission_denied", ErrorKind::PermissionDenied),
    ("permission denied", ErrorKind::PermissionDenied),
    ("ssh_fx_file_already_exists", ErrorKind::AlreadyExists),
    ("file exists", ErrorKind::AlreadyExists),
];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a failed remote invocation against `path`.
pub fn classify(dialect: Dialect, result: &ExecResult, path: &str) -> PathError {
    let diagnostic = diagnostic_text(dialect, result);
    trace!(%dialect, exit_code = result.exit_code, %diagnostic, "classifying remote failure");

    let kind = match dialect {
        Dialect::Posix => match_table(POSIX_PATTERNS, &diagnostic),
        Dialect::Windows => classify_windows(&diagnostic),
        Dialect::EfiShell => {
            let lines: Vec<&str> = efi_diagnostics(&diagnostic).collect();
            match_table(EFI_PATTERNS, &lines.join("\n"))
        }
    };

    match kind {
        Some(kind) => PathError::from_kind(kind, path, diagnostic),
        None => PathError::RemoteOperationFailed {
            exit_code: result.exit_code,
            diagnostic,
        },
    }
}

/// Classify a free-form transport message, such as an SFTP status error.
pub fn classify_message(message: &str, path: &str) -> PathError {
    match match_table(TRANSPORT_PATTERNS, message) {
        Some(kind) => PathError::from_kind(kind, path, message),
        None => PathError::Transport(message.to_string()),
    }
}

/// Whether EFI shell output carries one of the shell's error strings.
pub(crate) fn efi_reports_error(output: &str) -> bool {
    efi_diagnostics(output).any(|line| match_table(EFI_PATTERNS, line).is_some())
}

/// Lines of EFI shell output shaped like the shell's own diagnostics,
/// `<command>: <message>`.  Listing rows, headers, prompts and `cd`
/// output never have that shape, whatever the file names in them.
pub(crate) fn efi_diagnostics(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| {
        let Some((command, message)) = line.split_once(':') else {
            return false;
        };
        !command.is_empty()
            && command
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && message.starts_with(' ')
    })
}

/// Prefer stderr, except on the EFI shell, which reports on stdout.
fn diagnostic_text(dialect: Dialect, result: &ExecResult) -> String {
    let stdout = result.stdout_text().trim().to_string();
    let stderr = result.stderr_text();
    match dialect {
        Dialect::EfiShell if !stdout.is_empty() => stdout,
        _ if !stderr.is_empty() => stderr,
        _ => stdout,
    }
}

fn match_table(table: &[(&str, ErrorKind)], text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    table
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| *kind)
}

fn classify_windows(diagnostic: &str) -> Option<ErrorKind> {
    for line in diagnostic.lines() {
        let mut fields = line.trim().splitn(3, '|');
        let (Some(type_name), Some(hresult), Some(_message)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if let Some(kind) = parse_hresult(hresult).and_then(win32_kind) {
            return Some(kind);
        }
        let short = type_name.rsplit('.').next().unwrap_or(type_name);
        if let Some((_, kind)) = WINDOWS_TYPES.iter().find(|(name, _)| *name == short) {
            return Some(*kind);
        }
    }
    match_table(WINDOWS_MESSAGES, diagnostic)
}

fn parse_hresult(text: &str) -> Option<u32> {
    let hex = text.trim().strip_prefix("0x").or_else(|| text.trim().strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok()
}

fn win32_kind(hresult: u32) -> Option<ErrorKind> {
    // FACILITY_WIN32 HRESULTs look like 0x8007xxxx.
    if hresult & 0xFFFF_0000 != 0x8007_0000 {
        return None;
    }
    let code = hresult & 0xFFFF;
    WIN32_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn failed(stderr: &str, stdout: &str, exit_code: i32) -> ExecResult {
        ExecResult {
            stdout: Bytes::from(stdout.to_string()),
            stderr: Bytes::from(stderr.to_string()),
            exit_code,
        }
    }

    #[test]
    fn posix_not_empty() {
        let err = classify(
            Dialect::Posix,
            &failed("rmdir: failed to remove '/tmp/a': Directory not empty", "", 1),
            "/tmp/a",
        );
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        assert_eq!(
            err.diagnostic(),
            Some("rmdir: failed to remove '/tmp/a': Directory not empty")
        );
    }

    #[test]
    fn posix_busybox_messages() {
        let err = classify(
            Dialect::Posix,
            &failed("rm: can't remove '/x': Is a directory", "", 1),
            "/x",
        );
        assert_eq!(err.kind(), ErrorKind::NotAFile);

        let err = classify(
            Dialect::Posix,
            &failed("mkdir: can't create directory '/ro/x': Read-only file system", "", 1),
            "/ro/x",
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn posix_dash_redirection_into_missing_directory() {
        let err = classify(
            Dialect::Posix,
            &failed("sh: 1: cannot create /tmp/nope/f: Directory nonexistent", "", 2),
            "/tmp/nope/f",
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn posix_iconv_failure_is_invalid_data() {
        let err = classify(
            Dialect::Posix,
            &failed("iconv: cannot convert", "", 1),
            "/f",
        );
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_failure_keeps_exit_code() {
        let err = classify(Dialect::Posix, &failed("segfault", "", 139), "/f");
        match err {
            PathError::RemoteOperationFailed {
                exit_code,
                diagnostic,
            } => {
                assert_eq!(exit_code, 139);
                assert_eq!(diagnostic, "segfault");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn windows_hresult_wins_over_type() {
        let err = classify(
            Dialect::Windows,
            &failed(
                "System.IO.IOException|0x80070091|The directory is not empty.",
                "",
                1,
            ),
            r"C:\a",
        );
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
    }

    #[test]
    fn windows_exception_type() {
        let err = classify(
            Dialect::Windows,
            &failed(
                "System.IO.DirectoryNotFoundException|0x80070003|Could not find a part of the path.",
                "",
                1,
            ),
            r"C:\nope\x",
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = classify(
            Dialect::Windows,
            &failed(
                "System.UnauthorizedAccessException|0x80070005|Access to the path is denied.",
                "",
                1,
            ),
            r"C:\Windows\x",
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn windows_message_fallback() {
        let err = classify(
            Dialect::Windows,
            &failed("The system cannot find the file specified.", "", 1),
            r"C:\x",
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn efi_errors_come_from_stdout() {
        let err = classify(
            Dialect::EfiShell,
            &failed("", "rm: Directory Not Empty - FS0:\\a\r\nFS0:\\> ", 1),
            r"FS0:\a",
        );
        assert_eq!(err.kind(), ErrorKind::NotEmpty);

        let err = classify(
            Dialect::EfiShell,
            &failed("", "mkdir: Write Protected", 1),
            r"FS0:\a",
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn efi_file_names_are_not_diagnostics() {
        let listing = "Directory of: FS0:\\notes\\\r\n\
                       10/03/2019 15:23 12 not found.txt\r\n\
                       10/03/2019 15:23 12 access denied.log\r\n\
                       2 File(s) 24 bytes\r\n\
                       FS0:\\notes\\> ";
        assert!(!efi_reports_error(listing));
        assert!(efi_reports_error("ls: File Not Found - 'FS0:\\x'\r\nFS0:\\> "));

        let err = classify(
            Dialect::EfiShell,
            &failed("", "FS0:\\not found\\> ", 1),
            r"FS0:\not found",
        );
        assert_eq!(err.kind(), ErrorKind::RemoteOperationFailed);
    }

    #[test]
    fn transport_messages() {
        assert_eq!(
            classify_message("SSH_FX_NO_SUCH_FILE: no such file", "/x").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_message("channel closed", "/x").kind(),
            ErrorKind::Transport
        );
    }
}
