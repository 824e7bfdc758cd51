//! POSIX `sh` command lines.
//!
//! Every path is single-quoted.  Relative paths that start with `-` get a
//! `./` prefix so no utility mistakes them for an option.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;

use super::TypeTest;
use crate::connection::ExecResult;
use crate::dialect::shell_escape;
use crate::encoding::TextErrors;
use crate::errors::{PathError, PathResult};
use crate::syntax::PathSyntax;

/// Quoted command operand for `path`.
pub(super) fn operand(path: &PathSyntax) -> String {
    let text = path.to_string();
    if text.starts_with('-') {
        shell_escape(&format!("./{text}"))
    } else {
        shell_escape(&text)
    }
}

pub(super) fn type_test(test: TypeTest, path: &PathSyntax) -> String {
    let flag = match test {
        TypeTest::Exists => "-e",
        TypeTest::File => "-f",
        TypeTest::Dir => "-d",
    };
    format!("test {flag} {}", operand(path))
}

/// `test` exits 1 with nothing on stderr for a clean "no".
pub(super) fn test_outcome(result: &ExecResult) -> Option<bool> {
    match result.exit_code {
        0 => Some(true),
        1 if result.stderr.is_empty() => Some(false),
        _ => None,
    }
}

/// `-m` only when `mode` differs from the default, so the umask still
/// applies in the common case.
pub(super) fn mkdir(path: &PathSyntax, mode: u32, parents: bool) -> String {
    let mut cmd = String::from("mkdir");
    if parents {
        cmd.push_str(" -p");
    }
    if mode != 0o777 {
        cmd.push_str(&format!(" -m {:o}", mode & 0o7777));
    }
    cmd.push(' ');
    cmd.push_str(&operand(path));
    cmd
}

pub(super) fn rmdir(path: &PathSyntax) -> String {
    format!("rmdir {}", operand(path))
}

pub(super) fn unlink(path: &PathSyntax) -> String {
    format!("rm {}", operand(path))
}

pub(super) fn rename(src: &PathSyntax, dst: &PathSyntax) -> String {
    format!("mv -f -T {} {}", operand(src), operand(dst))
}

/// Create with noclobber so an existing file is never truncated.
pub(super) fn touch(path: &PathSyntax, mode: u32) -> String {
    let target = operand(path);
    let mut cmd = format!("( set -C; : > {target} )");
    if mode != 0o666 {
        cmd.push_str(&format!(" && chmod {:o} {target}", mode & 0o7777));
    }
    cmd
}

pub(super) fn chmod(path: &PathSyntax, mode: u32) -> String {
    format!("chmod {:o} {}", mode & 0o7777, operand(path))
}

/// `device:inode` of both paths.  GNU `stat` takes `-c`; BSD `stat` only
/// when `-c` is rejected, where `-f` is the format flag.
pub(super) fn identity(a: &PathSyntax, b: &PathSyntax) -> String {
    let (a, b) = (operand(a), operand(b));
    format!(
        "if stat -c '%i' / >/dev/null 2>&1; then stat -L -c '%d:%i' {a} {b}; \
         else stat -L -f '%d:%i' {a} {b}; fi"
    )
}

pub(super) fn parse_identities(stdout: &str) -> PathResult<(String, String)> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(a), Some(b)) => Ok((a.to_string(), b.to_string())),
        _ => Err(PathError::RemoteOperationFailed {
            exit_code: 0,
            diagnostic: format!("unexpected stat output: {stdout:?}"),
        }),
    }
}

/// Convert a file from `charset` to UTF-8 on the remote.
pub(super) fn iconv_read(path: &PathSyntax, charset: &str, errors: TextErrors) -> String {
    let lenient = match errors {
        TextErrors::Strict => "",
        // iconv cannot substitute on input; both lenient modes drop.
        TextErrors::Replace | TextErrors::Ignore => " -c",
    };
    format!("iconv{lenient} -f {charset} -t UTF-8 {}", operand(path))
}

fn iconv_output(charset: &str, errors: TextErrors) -> String {
    match errors {
        TextErrors::Strict => format!("iconv -f UTF-8 -t {charset}"),
        TextErrors::Replace => format!("iconv -f UTF-8 -t {charset}//TRANSLIT"),
        TextErrors::Ignore => format!("iconv -c -f UTF-8 -t {charset}"),
    }
}

/// Replace `path` with `staging` only once the conversion has succeeded.
/// `cat` keeps the target's inode and mode.
fn commit(staging: &str, path: &PathSyntax, cleanup: &str) -> String {
    format!(
        "&& cat {staging} > {}; status=$?; rm -f {cleanup}; exit $status",
        operand(path)
    )
}

/// Ship UTF-8 `text` as base64 and convert it to `charset` on the remote.
pub(super) fn iconv_write(
    path: &PathSyntax,
    staging: &PathSyntax,
    charset: &str,
    errors: TextErrors,
    text: &str,
) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    let staging = operand(staging);
    format!(
        "base64 -d <<'__REMOTE_PATH_EOF__' | {} > {staging} {}\n{encoded}\n__REMOTE_PATH_EOF__",
        iconv_output(charset, errors),
        commit(&staging, path, &staging)
    )
}

/// Largest UTF-8 payload sent inline; the kernel caps one argument at
/// 128 KiB and base64 grows the text by a third.
pub(super) const INLINE_PAYLOAD_LIMIT: usize = 64 * 1024;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Bytes of the target name kept in a staging name; the rest of the name
/// must still fit `NAME_MAX`.
const STAGING_NAME_BYTES: usize = 128;

/// Hidden sibling of `path` used to upload large payloads.
pub(super) fn staging_for(path: &PathSyntax) -> PathResult<PathSyntax> {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut stem = path.name();
    if stem.len() > STAGING_NAME_BYTES {
        let mut end = STAGING_NAME_BYTES;
        while !stem.is_char_boundary(end) {
            end -= 1;
        }
        stem = &stem[..end];
    }
    let name = format!(".{stem}.remote-path-{}-{n}", std::process::id());
    path.parent().child(&name)
}

/// Convert the uploaded UTF-8 file `input` into `path` through `output`,
/// then remove both staging files.
pub(super) fn iconv_from_staging(
    input: &PathSyntax,
    output: &PathSyntax,
    path: &PathSyntax,
    charset: &str,
    errors: TextErrors,
) -> String {
    let (input, output) = (operand(input), operand(output));
    format!(
        "{} {input} > {output} {}",
        iconv_output(charset, errors),
        commit(&output, path, &format!("{input} {output}"))
    )
}
