//! Operation translator.
//!
//! Each public operation is one async function that performs the semantic
//! pre-checks shared by every dialect, then dispatches on the path's
//! [`Dialect`] with a single `match` to build the remote invocation.  The
//! command builders and output parsers live in the [`posix`], [`windows`]
//! and [`efi`] submodules; failures go through [`crate::classify`].
//!
//! Nothing here retries or caches: every call re-queries the remote.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::classify::classify;
use crate::connection::ExecResult;
use crate::dialect::Dialect;
use crate::encoding::{self, TextErrors};
use crate::errors::{ErrorKind, PathError, PathResult};
use crate::registry::Session;
use crate::syntax::PathSyntax;

mod efi;
mod posix;
mod windows;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The high-level operation being translated, used in logs and in
/// [`PathError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Exists,
    IsFile,
    IsDir,
    Mkdir,
    Rmdir,
    Unlink,
    Rename,
    Touch,
    Chmod,
    ReadText,
    WriteText,
    AppendText,
    Expanduser,
    Samefile,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Exists => "exists",
            OperationKind::IsFile => "is_file",
            OperationKind::IsDir => "is_dir",
            OperationKind::Mkdir => "mkdir",
            OperationKind::Rmdir => "rmdir",
            OperationKind::Unlink => "unlink",
            OperationKind::Rename => "rename",
            OperationKind::Touch => "touch",
            OperationKind::Chmod => "chmod",
            OperationKind::ReadText => "read_text",
            OperationKind::WriteText => "write_text",
            OperationKind::AppendText => "append_text",
            OperationKind::Expanduser => "expanduser",
            OperationKind::Samefile => "samefile",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeTest {
    Exists,
    File,
    Dir,
}

impl TypeTest {
    fn operation(self) -> OperationKind {
        match self {
            TypeTest::Exists => OperationKind::Exists,
            TypeTest::File => OperationKind::IsFile,
            TypeTest::Dir => OperationKind::IsDir,
        }
    }
}

/// What `chmod` managed to apply.
///
/// POSIX applies every bit.  Windows and the EFI shell only have a
/// read-only attribute: `applied` is then the mode that attribute leaves
/// the file with, read always granted and the owner-write bit following
/// the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChmodOutcome {
    pub requested: u32,
    pub applied: u32,
}

impl ChmodOutcome {
    /// Bits where the resulting mode differs from the request, whether
    /// asked for and not granted or granted without being asked for.
    pub fn unapplied(&self) -> u32 {
        (self.requested ^ self.applied) & 0o7777
    }

    pub fn is_complete(&self) -> bool {
        self.unapplied() == 0
    }
}

/// Mode a file has under the read-only attribute alone.
fn attribute_mode(readonly: bool) -> u32 {
    if readonly { 0o444 } else { 0o644 }
}

// ---------------------------------------------------------------------------
// Invocation helpers
// ---------------------------------------------------------------------------

async fn run(
    session: &Session,
    op: OperationKind,
    path: &PathSyntax,
    command: String,
) -> PathResult<ExecResult> {
    let dialect = path.dialect();
    let command = match dialect {
        Dialect::Windows => {
            let line = windows::command_line(&session.config.powershell, &command);
            if line.len() > windows::COMMAND_LINE_LIMIT {
                return Err(PathError::InvalidPath {
                    text: path.to_string(),
                    reason: format!(
                        "{op} needs a {} character command line, over the {} limit",
                        line.len(),
                        windows::COMMAND_LINE_LIMIT
                    ),
                });
            }
            line
        }
        Dialect::Posix | Dialect::EfiShell => command,
    };
    debug!(%op, %dialect, %path, "remote invocation");
    let result = session.connection.execute(&command).await?;
    trace!(
        exit_code = result.exit_code,
        stdout = %String::from_utf8_lossy(&result.stdout),
        stderr = %String::from_utf8_lossy(&result.stderr),
        "remote result"
    );
    Ok(result)
}

fn failed(dialect: Dialect, result: &ExecResult) -> bool {
    match dialect {
        Dialect::EfiShell => efi::failed(result),
        Dialect::Posix | Dialect::Windows => !result.success(),
    }
}

/// Run and classify any failure against `path`.
async fn run_checked(
    session: &Session,
    op: OperationKind,
    path: &PathSyntax,
    command: String,
) -> PathResult<ExecResult> {
    let result = run(session, op, path, command).await?;
    if failed(path.dialect(), &result) {
        return Err(classify(path.dialect(), &result, &path.to_string()));
    }
    Ok(result)
}

async fn read_bytes(session: &Session, op: OperationKind, path: &PathSyntax) -> PathResult<Bytes> {
    debug!(%op, dialect = %path.dialect(), %path, "remote read");
    session.connection.read_bytes(&path.to_string()).await
}

async fn write_bytes(
    session: &Session,
    op: OperationKind,
    path: &PathSyntax,
    data: Bytes,
) -> PathResult<usize> {
    debug!(%op, dialect = %path.dialect(), %path, bytes = data.len(), "remote write");
    session.connection.write_bytes(&path.to_string(), data).await
}

/// `ls` the path; `None` when the shell reports it missing.
async fn efi_listing(
    session: &Session,
    op: OperationKind,
    path: &PathSyntax,
) -> PathResult<Option<efi::Listing>> {
    let result = run(session, op, path, efi::ls(path)).await?;
    let output = efi::clean_output(&result.stdout_text());
    if efi::is_missing(&output) {
        return Ok(None);
    }
    if efi::failed(&result) {
        return Err(classify(Dialect::EfiShell, &result, &path.to_string()));
    }
    Ok(Some(efi::parse_listing(&output)))
}

fn error(kind: ErrorKind, path: &PathSyntax, diagnostic: impl Into<String>) -> PathError {
    PathError::from_kind(kind, &path.to_string(), diagnostic)
}

// ---------------------------------------------------------------------------
// Type tests
// ---------------------------------------------------------------------------

/// `exists`, `is_file` or `is_dir`.  A clean negative is `false`.
pub(crate) async fn test(session: &Session, path: &PathSyntax, test: TypeTest) -> PathResult<bool> {
    let op = test.operation();
    match path.dialect() {
        Dialect::Posix => {
            let result = run(session, op, path, posix::type_test(test, path)).await?;
            posix::test_outcome(&result)
                .ok_or_else(|| classify(Dialect::Posix, &result, &path.to_string()))
        }
        Dialect::Windows => {
            let result = run_checked(session, op, path, windows::type_test(test, path)).await?;
            windows::parse_bool(&result.stdout_text())
        }
        Dialect::EfiShell => {
            let Some(listing) = efi_listing(session, op, path).await? else {
                return Ok(false);
            };
            Ok(match test {
                TypeTest::Exists => true,
                TypeTest::Dir => listing.describes_directory(path),
                TypeTest::File => !listing.describes_directory(path),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

pub(crate) async fn mkdir(
    session: &Session,
    path: &PathSyntax,
    mode: u32,
    parents: bool,
    exist_ok: bool,
) -> PathResult<()> {
    if test(session, path, TypeTest::Dir).await? {
        if exist_ok {
            debug!(%path, "directory already present");
            return Ok(());
        }
        return Err(error(ErrorKind::AlreadyExists, path, "directory exists"));
    }
    if test(session, path, TypeTest::Exists).await? {
        return Err(error(
            ErrorKind::AlreadyExists,
            path,
            "a non-directory exists at this path",
        ));
    }

    if !parents {
        let parent = path.parent();
        if !test(session, &parent, TypeTest::Dir).await? {
            return Err(error(
                ErrorKind::NoSuchParent,
                path,
                format!("{parent} is not a directory"),
            ));
        }
        return create_dir(session, path, mode, false).await;
    }

    match path.dialect() {
        Dialect::Posix | Dialect::Windows => match create_dir(session, path, mode, true).await {
            // The target is absent, so either kind means an ancestor is a file.
            Err(e) if matches!(e.kind(), ErrorKind::NotADirectory | ErrorKind::AlreadyExists) => {
                let diagnostic = e.diagnostic().unwrap_or_default().to_string();
                Err(error(ErrorKind::NoSuchParent, path, diagnostic))
            }
            other => other,
        },
        Dialect::EfiShell => {
            // No recursive primitive: create each missing ancestor, outermost first.
            let mut missing = Vec::new();
            for ancestor in path.ancestors() {
                match efi_listing(session, OperationKind::Mkdir, &ancestor).await? {
                    Some(listing) if listing.describes_directory(&ancestor) => break,
                    Some(_) => {
                        return Err(error(
                            ErrorKind::NoSuchParent,
                            path,
                            format!("{ancestor} is not a directory"),
                        ));
                    }
                    None => missing.push(ancestor),
                }
            }
            for ancestor in missing.iter().rev() {
                create_dir(session, ancestor, mode, false).await?;
            }
            create_dir(session, path, mode, false).await
        }
    }
}

async fn create_dir(session: &Session, path: &PathSyntax, mode: u32, parents: bool) -> PathResult<()> {
    let command = match path.dialect() {
        Dialect::Posix => posix::mkdir(path, mode, parents),
        Dialect::Windows => windows::mkdir(path),
        Dialect::EfiShell => efi::mkdir(path),
    };
    run_checked(session, OperationKind::Mkdir, path, command).await?;
    Ok(())
}

pub(crate) async fn rmdir(session: &Session, path: &PathSyntax) -> PathResult<()> {
    let op = OperationKind::Rmdir;
    let command = match path.dialect() {
        Dialect::Posix => posix::rmdir(path),
        Dialect::Windows => windows::rmdir(path),
        Dialect::EfiShell => {
            // `rm` recurses on the shell, so emptiness is checked here.
            let Some(listing) = efi_listing(session, op, path).await? else {
                return Err(error(ErrorKind::NotFound, path, "no such directory"));
            };
            if !listing.describes_directory(path) {
                return Err(error(ErrorKind::NotADirectory, path, "not a directory"));
            }
            if listing.children().next().is_some() {
                return Err(error(ErrorKind::NotEmpty, path, "directory not empty"));
            }
            efi::rm(path)
        }
    };
    run_checked(session, op, path, command).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub(crate) async fn unlink(session: &Session, path: &PathSyntax) -> PathResult<()> {
    if test(session, path, TypeTest::Dir).await? {
        return Err(error(ErrorKind::NotAFile, path, "is a directory"));
    }
    if !test(session, path, TypeTest::Exists).await? {
        return Err(error(ErrorKind::NotFound, path, "no such file"));
    }
    let command = match path.dialect() {
        Dialect::Posix => posix::unlink(path),
        Dialect::Windows => windows::unlink(path),
        Dialect::EfiShell => efi::rm(path),
    };
    run_checked(session, OperationKind::Unlink, path, command).await?;
    Ok(())
}

/// Move `src` to `dst`, replacing an existing destination file.
pub(crate) async fn rename(session: &Session, src: &PathSyntax, dst: &PathSyntax) -> PathResult<()> {
    let op = OperationKind::Rename;
    if !test(session, src, TypeTest::Exists).await? {
        return Err(error(ErrorKind::NotFound, src, "no such file or directory"));
    }
    if src.to_string() == dst.to_string() {
        debug!(%src, "rename onto itself");
        return Ok(());
    }
    let command = match src.dialect() {
        Dialect::Posix => posix::rename(src, dst),
        Dialect::Windows => windows::rename(src, dst),
        Dialect::EfiShell if src.normalized() == dst.normalized() => {
            // Same entry under case folding; `rm` of the destination would
            // remove the source.
            let temporary = efi::temporary_sibling(src)?;
            run_checked(session, op, src, efi::mv(src, &temporary)).await?;
            efi::mv(&temporary, dst)
        }
        Dialect::EfiShell => {
            if let Some(listing) = efi_listing(session, op, dst).await? {
                if listing.describes_directory(dst) {
                    return Err(error(
                        ErrorKind::AlreadyExists,
                        dst,
                        "destination is a directory",
                    ));
                }
                run_checked(session, op, dst, efi::rm(dst)).await?;
            }
            efi::mv(src, dst)
        }
    };
    run_checked(session, op, src, command).await?;
    Ok(())
}

pub(crate) async fn touch(
    session: &Session,
    path: &PathSyntax,
    mode: u32,
    exist_ok: bool,
) -> PathResult<()> {
    let op = OperationKind::Touch;
    if test(session, path, TypeTest::Exists).await? {
        if exist_ok {
            return Ok(());
        }
        return Err(error(ErrorKind::AlreadyExists, path, "file exists"));
    }
    let readonly = mode & 0o200 == 0;
    match path.dialect() {
        Dialect::Posix => {
            run_checked(session, op, path, posix::touch(path, mode)).await?;
        }
        Dialect::Windows => {
            run_checked(session, op, path, windows::touch(path, readonly)).await?;
        }
        Dialect::EfiShell => {
            write_bytes(session, op, path, Bytes::new()).await?;
            if readonly {
                run_checked(session, op, path, efi::attrib(path, true)).await?;
            }
        }
    }
    Ok(())
}

pub(crate) async fn chmod(session: &Session, path: &PathSyntax, mode: u32) -> PathResult<ChmodOutcome> {
    let op = OperationKind::Chmod;
    let requested = mode & 0o7777;
    let readonly = requested & 0o200 == 0;
    let outcome = match path.dialect() {
        Dialect::Posix => {
            run_checked(session, op, path, posix::chmod(path, requested)).await?;
            ChmodOutcome {
                requested,
                applied: requested,
            }
        }
        Dialect::Windows | Dialect::EfiShell => {
            let command = match path.dialect() {
                Dialect::Windows => windows::chmod(path, readonly),
                _ => efi::attrib(path, readonly),
            };
            run_checked(session, op, path, command).await?;
            ChmodOutcome {
                requested,
                applied: attribute_mode(readonly),
            }
        }
    };
    if !outcome.is_complete() {
        warn!(
            %path,
            dialect = %path.dialect(),
            requested = format_args!("{:o}", outcome.requested),
            unapplied = format_args!("{:o}", outcome.unapplied()),
            "mode bits not representable on this dialect"
        );
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

pub(crate) async fn read_text(
    session: &Session,
    path: &PathSyntax,
    encoding: Option<&str>,
    errors: TextErrors,
) -> PathResult<String> {
    let op = OperationKind::ReadText;
    let dialect = path.dialect();
    let enc = encoding::resolve(dialect, encoding)?;

    let text = match dialect {
        Dialect::Posix if enc.is_posix_utf8() => {
            encoding::decode_utf8(&read_bytes(session, op, path).await?, errors)?
        }
        Dialect::Posix => {
            let result = run_checked(session, op, path, posix::iconv_read(path, enc.native, errors)).await?;
            encoding::decode_utf8(&result.stdout, errors)?
        }
        Dialect::Windows => {
            let result =
                run_checked(session, op, path, windows::read_text(path, enc.native, errors)).await?;
            let utf8 = windows::decode_output(&result.stdout_text())?;
            encoding::decode_utf8(&utf8, TextErrors::Strict)?
        }
        Dialect::EfiShell => {
            let bytes = read_bytes(session, op, path).await?;
            if enc.native == encoding::EFI_ASCII {
                encoding::decode_ascii(&bytes, errors)?
            } else {
                encoding::decode_ucs2(&bytes, errors)?
            }
        }
    };
    Ok(encoding::newlines_after_read(text, dialect))
}

/// Write `data` and return the number of characters written after newline
/// translation.
pub(crate) async fn write_text(
    session: &Session,
    path: &PathSyntax,
    data: &str,
    encoding: Option<&str>,
    errors: TextErrors,
    newline: Option<&str>,
) -> PathResult<usize> {
    let op = OperationKind::WriteText;
    let dialect = path.dialect();
    let enc = encoding::resolve(dialect, encoding)?;
    let text = encoding::newlines_for_write(data, dialect, newline);
    let count = text.chars().count();

    match dialect {
        Dialect::Posix if enc.is_posix_utf8() => {
            write_bytes(session, op, path, Bytes::from(text.into_bytes())).await?;
        }
        Dialect::Posix if text.len() <= posix::INLINE_PAYLOAD_LIMIT => {
            let staging = posix::staging_for(path)?;
            let command = posix::iconv_write(path, &staging, enc.native, errors, &text);
            run_checked(session, op, path, command).await?;
        }
        Dialect::Posix => {
            let input = posix::staging_for(path)?;
            let output = posix::staging_for(path)?;
            write_bytes(session, op, &input, Bytes::from(text.into_bytes())).await?;
            let command = posix::iconv_from_staging(&input, &output, path, enc.native, errors);
            run_checked(session, op, path, command).await?;
        }
        Dialect::Windows => write_windows(session, path, enc.native, errors, &text).await?,
        Dialect::EfiShell => {
            let bytes = if enc.native == encoding::EFI_ASCII {
                encoding::encode_ascii(&text, errors)?
            } else {
                encoding::encode_ucs2(&text, errors)?
            };
            write_bytes(session, op, path, Bytes::from(bytes)).await?;
        }
    }
    Ok(count)
}

/// Inline small payloads; stage larger ones in chunks under the remote's
/// temp directory.
async fn write_windows(
    session: &Session,
    path: &PathSyntax,
    expr: &str,
    errors: TextErrors,
    text: &str,
) -> PathResult<()> {
    let op = OperationKind::WriteText;
    let payload = windows::encode_payload(text);
    if payload.len() <= windows::INLINE_PAYLOAD_LIMIT {
        let script = windows::write_text(path, expr, errors, &payload);
        if windows::fits_command_line(&session.config.powershell, &script) {
            run_checked(session, op, path, script).await?;
            return Ok(());
        }
        debug!(%path, "inline write exceeds the command-line limit, staging");
    }

    let name = windows::staging_name();
    let mut start = 0;
    while start < payload.len() {
        let end = (start + windows::INLINE_PAYLOAD_LIMIT).min(payload.len());
        let script = windows::stage_chunk(&name, &payload[start..end], start == 0);
        run_checked(session, op, path, script).await?;
        start = end;
    }
    run_checked(session, op, path, windows::write_staged(path, expr, errors, &name)).await?;
    Ok(())
}

/// Read, append and write back.  Not atomic.
pub(crate) async fn append_text(
    session: &Session,
    path: &PathSyntax,
    data: &str,
    encoding: Option<&str>,
) -> PathResult<usize> {
    let dialect = path.dialect();
    encoding::resolve(dialect, encoding)?;
    let existing = match read_text(session, path, encoding, TextErrors::Strict).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    debug!(op = %OperationKind::AppendText, %path, existing = existing.len(), "appending");
    let appended = encoding::newlines_for_write(data, dialect, None).chars().count();
    write_text(
        session,
        path,
        &(existing + data),
        encoding,
        TextErrors::Strict,
        None,
    )
    .await?;
    Ok(appended)
}

// ---------------------------------------------------------------------------
// Identity and home directories
// ---------------------------------------------------------------------------

pub(crate) async fn samefile(session: &Session, a: &PathSyntax, b: &PathSyntax) -> PathResult<bool> {
    let op = OperationKind::Samefile;
    if a.dialect() != b.dialect() {
        return Ok(false);
    }
    match a.dialect() {
        Dialect::Posix => {
            let result = run_checked(session, op, a, posix::identity(a, b)).await?;
            let (first, second) = posix::parse_identities(&result.stdout_text())?;
            Ok(first == second)
        }
        Dialect::Windows => {
            let result = run_checked(session, op, a, windows::samefile(a, b)).await?;
            windows::parse_bool(&result.stdout_text())
        }
        Dialect::EfiShell => {
            for operand in [a, b] {
                if !test(session, operand, TypeTest::Exists).await? {
                    return Err(error(ErrorKind::NotFound, operand, "no such file or directory"));
                }
            }
            if a.is_absolute() && b.is_absolute() {
                return Ok(a.normalized() == b.normalized());
            }
            let result = run_checked(session, op, a, efi::CD.to_string()).await?;
            let cwd = efi::parse_cwd(&result.stdout_text())?;
            Ok(cwd.join(a).normalized() == cwd.join(b).normalized())
        }
    }
}

/// Replace a leading `~` or `~user` with the remote home directory.
pub(crate) async fn expanduser(session: &Session, path: &PathSyntax) -> PathResult<PathSyntax> {
    let dialect = path.dialect();
    if dialect == Dialect::EfiShell {
        return Err(PathError::Unsupported {
            operation: OperationKind::Expanduser,
            dialect,
        });
    }
    let Some(prefix) = path.tilde_prefix() else {
        return Ok(path.clone());
    };
    let user = &prefix[1..];
    let user = (!user.is_empty()).then_some(user);
    debug!(op = %OperationKind::Expanduser, %dialect, ?user, "resolving home directory");
    let home = session.connection.resolve_home(user).await?;
    let home = PathSyntax::parse(dialect, &home)?;
    Ok(home.join(&path.without_first_segment()))
}
