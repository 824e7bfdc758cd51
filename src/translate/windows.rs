//! Windows PowerShell scripts.
//!
//! Scripts use .NET `System.IO` directly so behaviour does not depend on
//! cmdlet versions, and are sent as `-EncodedCommand` so neither `cmd.exe`
//! nor PowerShell re-interprets quotes, `%` or `$` in paths.  Failures are
//! written to stderr as `Type|0xHRESULT|message` for the classifier.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;

use super::TypeTest;
use crate::dialect::powershell_literal;
use crate::encoding::TextErrors;
use crate::errors::{PathError, PathResult};
use crate::syntax::PathSyntax;

/// Largest base64 payload embedded in a single script.
pub(super) const INLINE_PAYLOAD_LIMIT: usize = 2000;

/// `cmd.exe` rejects longer command lines.
pub(super) const COMMAND_LINE_LIMIT: usize = 8191;

const PROLOGUE: &str = "$ErrorActionPreference = 'Stop'\n$ProgressPreference = 'SilentlyContinue'\n";

const CATCH: &str = r#"} catch {
  $e = $_.Exception
  if ($e -is [Management.Automation.MethodInvocationException] -and $e.InnerException) { $e = $e.InnerException }
  [Console]::Error.WriteLine(('{0}|0x{1:X8}|{2}' -f $e.GetType().FullName, $e.HResult, $e.Message))
  exit 1
}
"#;

/// Full command line running `script` through `powershell`.
pub(super) fn command_line(powershell: &str, script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(utf16);
    format!("{powershell} -NoProfile -NonInteractive -EncodedCommand {encoded}")
}

pub(super) fn fits_command_line(powershell: &str, script: &str) -> bool {
    command_line(powershell, script).len() <= COMMAND_LINE_LIMIT
}

fn wrap(body: &str) -> String {
    format!("{PROLOGUE}try {{\n{body}\n{CATCH}")
}

fn lit(path: &PathSyntax) -> String {
    powershell_literal(&path.to_string())
}

fn print_bool(condition: &str) -> String {
    format!("if ({condition}) {{ [Console]::Out.Write('True') }} else {{ [Console]::Out.Write('False') }}")
}

pub(super) fn parse_bool(stdout: &str) -> PathResult<bool> {
    match stdout.trim() {
        s if s.eq_ignore_ascii_case("true") => Ok(true),
        s if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(PathError::RemoteOperationFailed {
            exit_code: 0,
            diagnostic: format!("expected True or False, got {other:?}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub(super) fn type_test(test: TypeTest, path: &PathSyntax) -> String {
    let kind = match test {
        TypeTest::Exists => "",
        TypeTest::File => " -PathType Leaf",
        TypeTest::Dir => " -PathType Container",
    };
    wrap(&print_bool(&format!("Test-Path -LiteralPath {}{kind}", lit(path))))
}

pub(super) fn mkdir(path: &PathSyntax) -> String {
    wrap(&format!("[void][IO.Directory]::CreateDirectory({})", lit(path)))
}

pub(super) fn rmdir(path: &PathSyntax) -> String {
    wrap(&format!("[IO.Directory]::Delete({}, $false)", lit(path)))
}

pub(super) fn unlink(path: &PathSyntax) -> String {
    wrap(&format!("[IO.File]::Delete({})", lit(path)))
}

/// Replace an existing destination file, then move.  When both names
/// resolve to the same entry only the case changes, which goes through a
/// temporary name so the source is never deleted as the destination.
pub(super) fn rename(src: &PathSyntax, dst: &PathSyntax) -> String {
    wrap(&format!(
        "$src = {}; $dst = {}\n\
         $move = {{ param($from, $to) if ([IO.Directory]::Exists($from)) {{ [IO.Directory]::Move($from, $to) }} else {{ [IO.File]::Move($from, $to) }} }}\n\
         if ([IO.Path]::GetFullPath($src).TrimEnd('\\') -ieq [IO.Path]::GetFullPath($dst).TrimEnd('\\')) {{\n\
         \x20 $tmp = $src.TrimEnd('\\') + '.' + [Guid]::NewGuid().ToString('N')\n\
         \x20 & $move $src $tmp\n\
         \x20 & $move $tmp $dst\n\
         }} else {{\n\
         \x20 if ([IO.File]::Exists($dst)) {{ [IO.File]::SetAttributes($dst, 'Normal'); [IO.File]::Delete($dst) }}\n\
         \x20 & $move $src $dst\n\
         }}",
        lit(src),
        lit(dst)
    ))
}

fn set_read_only(readonly: bool) -> String {
    if readonly {
        "[IO.File]::SetAttributes($p, ([IO.File]::GetAttributes($p) -bor [IO.FileAttributes]::ReadOnly))"
            .to_string()
    } else {
        "[IO.File]::SetAttributes($p, ([IO.File]::GetAttributes($p) -band -bnot [IO.FileAttributes]::ReadOnly))"
            .to_string()
    }
}

pub(super) fn touch(path: &PathSyntax, readonly: bool) -> String {
    let mut body = format!("$p = {}\n[IO.File]::Open($p, 'CreateNew').Close()", lit(path));
    if readonly {
        body.push('\n');
        body.push_str(&set_read_only(true));
    }
    wrap(&body)
}

pub(super) fn chmod(path: &PathSyntax, readonly: bool) -> String {
    wrap(&format!(
        "$p = {}\n$null = [IO.File]::GetAttributes($p)\n{}",
        lit(path),
        set_read_only(readonly)
    ))
}

pub(super) fn samefile(a: &PathSyntax, b: &PathSyntax) -> String {
    wrap(&format!(
        "$a = [IO.Path]::GetFullPath((Resolve-Path -LiteralPath {}).ProviderPath).TrimEnd('\\')\n\
         $b = [IO.Path]::GetFullPath((Resolve-Path -LiteralPath {}).ProviderPath).TrimEnd('\\')\n{}",
        lit(a),
        lit(b),
        print_bool("$a -ieq $b")
    ))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Bind `$enc` to `expr` with fallbacks matching `errors`.
fn encoding_setup(expr: &str, errors: TextErrors) -> String {
    match errors {
        TextErrors::Replace => format!("$enc = {expr}"),
        TextErrors::Strict => format!(
            "$enc = ({expr}).Clone()\n\
             $enc.EncoderFallback = [Text.EncoderFallback]::ExceptionFallback\n\
             $enc.DecoderFallback = [Text.DecoderFallback]::ExceptionFallback"
        ),
        TextErrors::Ignore => format!(
            "$enc = ({expr}).Clone()\n\
             $enc.EncoderFallback = New-Object Text.EncoderReplacementFallback ''\n\
             $enc.DecoderFallback = New-Object Text.DecoderReplacementFallback ''"
        ),
    }
}

/// Read with `expr` and print the text as base64 of its UTF-8 bytes.
pub(super) fn read_text(path: &PathSyntax, expr: &str, errors: TextErrors) -> String {
    wrap(&format!(
        "{}\n$text = [IO.File]::ReadAllText({}, $enc)\n\
         [Console]::Out.Write([Convert]::ToBase64String([Text.Encoding]::UTF8.GetBytes($text)))",
        encoding_setup(expr, errors),
        lit(path)
    ))
}

pub(super) fn decode_output(stdout: &str) -> PathResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(stdout.trim())
        .map_err(|e| PathError::InvalidData(format!("malformed base64 from remote: {e}")))
}

pub(super) fn encode_payload(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

fn write_from(payload_expr: &str, path: &PathSyntax, expr: &str, errors: TextErrors) -> String {
    format!(
        "{}\n$text = [Text.Encoding]::UTF8.GetString([Convert]::FromBase64String({payload_expr}))\n\
         [IO.File]::WriteAllText({}, $text, $enc)",
        encoding_setup(expr, errors),
        lit(path)
    )
}

/// Write a base64 payload small enough to embed inline.
pub(super) fn write_text(path: &PathSyntax, expr: &str, errors: TextErrors, payload: &str) -> String {
    wrap(&write_from(&format!("'{payload}'"), path, expr, errors))
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique name for a staging file under the remote's temp directory.
pub(super) fn staging_name() -> String {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("remote-path-{}-{n}.b64", std::process::id())
}

fn staging_path(name: &str) -> String {
    format!(
        "[IO.Path]::Combine([IO.Path]::GetTempPath(), {})",
        powershell_literal(name)
    )
}

/// Append one chunk of a large payload to the staging file.
pub(super) fn stage_chunk(name: &str, chunk: &str, first: bool) -> String {
    let method = if first { "WriteAllText" } else { "AppendAllText" };
    wrap(&format!(
        "[IO.File]::{method}({}, '{chunk}')",
        staging_path(name)
    ))
}

/// Write the staged payload to `path` and remove the staging file.
pub(super) fn write_staged(path: &PathSyntax, expr: &str, errors: TextErrors, name: &str) -> String {
    wrap(&format!(
        "$s = {}\ntry {{\n{}\n}} finally {{ [IO.File]::Delete($s) }}",
        staging_path(name),
        write_from("[IO.File]::ReadAllText($s)", path, expr, errors)
    ))
}
