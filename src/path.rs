//! The public path type.
//!
//! A [`RemotePath`] is a [`PathSyntax`] bound to the session it came from.
//! Navigation is synchronous and purely syntactic; everything that touches
//! the remote is `async` and goes through [`crate::translate`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::dialect::Dialect;
use crate::encoding::TextErrors;
use crate::errors::{PathError, PathResult};
use crate::registry::Session;
use crate::syntax::{Anchor, PathSyntax};
use crate::translate::{self, ChmodOutcome, TypeTest};

/// Default mode for [`RemotePath::mkdir`], before the remote umask.
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Default mode for [`RemotePath::touch`], before the remote umask.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// A path on a remote host.
///
/// Equality, hashing and ordering follow the dialect's case rule and ignore
/// which connection the path belongs to.
#[derive(Clone)]
pub struct RemotePath {
    syntax: PathSyntax,
    session: Weak<Session>,
}

impl RemotePath {
    pub(crate) fn new(syntax: PathSyntax, session: Weak<Session>) -> Self {
        Self { syntax, session }
    }

    fn session(&self) -> PathResult<Arc<Session>> {
        self.session.upgrade().ok_or(PathError::ConnectionClosed)
    }

    fn derive(&self, syntax: PathSyntax) -> Self {
        Self {
            syntax,
            session: self.session.clone(),
        }
    }

    pub fn syntax(&self) -> &PathSyntax {
        &self.syntax
    }

    pub fn dialect(&self) -> Dialect {
        self.syntax.dialect()
    }

    /// Whether both paths were created from the same [`crate::Remote`].
    pub fn same_connection(&self, other: &RemotePath) -> bool {
        Weak::ptr_eq(&self.session, &other.session)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn anchor(&self) -> &Anchor {
        self.syntax.anchor()
    }

    pub fn segments(&self) -> &[String] {
        self.syntax.segments()
    }

    pub fn is_absolute(&self) -> bool {
        self.syntax.is_absolute()
    }

    pub fn name(&self) -> &str {
        self.syntax.name()
    }

    pub fn stem(&self) -> &str {
        self.syntax.stem()
    }

    pub fn suffix(&self) -> &str {
        self.syntax.suffix()
    }

    pub fn parent(&self) -> RemotePath {
        self.derive(self.syntax.parent())
    }

    /// Parse `text` in this path's dialect and join it on.
    pub fn join(&self, text: &str) -> PathResult<RemotePath> {
        Ok(self.derive(self.syntax.join_str(text)?))
    }

    pub fn child(&self, name: &str) -> PathResult<RemotePath> {
        Ok(self.derive(self.syntax.child(name)?))
    }

    pub fn with_name(&self, name: &str) -> PathResult<RemotePath> {
        Ok(self.derive(self.syntax.with_name(name)?))
    }

    pub fn with_suffix(&self, suffix: &str) -> PathResult<RemotePath> {
        Ok(self.derive(self.syntax.with_suffix(suffix)?))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn exists(&self) -> PathResult<bool> {
        translate::test(&*self.session()?, &self.syntax, TypeTest::Exists).await
    }

    pub async fn is_file(&self) -> PathResult<bool> {
        translate::test(&*self.session()?, &self.syntax, TypeTest::File).await
    }

    pub async fn is_dir(&self) -> PathResult<bool> {
        translate::test(&*self.session()?, &self.syntax, TypeTest::Dir).await
    }

    /// Whether both paths name the same file on the remote.
    ///
    /// Paths on different connections are never the same file.
    pub async fn samefile(&self, other: &RemotePath) -> PathResult<bool> {
        let session = self.session()?;
        if !self.same_connection(other) {
            return Ok(false);
        }
        translate::samefile(&session, &self.syntax, &other.syntax).await
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create this directory.  `mode` is honoured on POSIX only.
    pub async fn mkdir(&self, mode: u32, parents: bool, exist_ok: bool) -> PathResult<()> {
        translate::mkdir(&*self.session()?, &self.syntax, mode, parents, exist_ok).await
    }

    pub async fn rmdir(&self) -> PathResult<()> {
        translate::rmdir(&*self.session()?, &self.syntax).await
    }

    pub async fn unlink(&self) -> PathResult<()> {
        translate::unlink(&*self.session()?, &self.syntax).await
    }

    /// Move this file or directory to `target`, replacing an existing file
    /// there.  Returns the new path; `self` is left untouched.
    pub async fn rename(&self, target: &str) -> PathResult<RemotePath> {
        let session = self.session()?;
        let target = PathSyntax::parse(self.dialect(), target)?;
        translate::rename(&session, &self.syntax, &target).await?;
        Ok(self.derive(target))
    }

    /// Create an empty file.  An existing file is left alone when
    /// `exist_ok` is set.
    pub async fn touch(&self, mode: u32, exist_ok: bool) -> PathResult<()> {
        translate::touch(&*self.session()?, &self.syntax, mode, exist_ok).await
    }

    pub async fn chmod(&self, mode: u32) -> PathResult<ChmodOutcome> {
        translate::chmod(&*self.session()?, &self.syntax, mode).await
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Read the file as text.  `None` selects the dialect's default
    /// encoding.
    pub async fn read_text(&self, encoding: Option<&str>, errors: TextErrors) -> PathResult<String> {
        translate::read_text(&*self.session()?, &self.syntax, encoding, errors).await
    }

    /// Write `data`, replacing the file.  Returns the number of characters
    /// written after newline translation.
    pub async fn write_text(
        &self,
        data: &str,
        encoding: Option<&str>,
        errors: TextErrors,
        newline: Option<&str>,
    ) -> PathResult<usize> {
        translate::write_text(&*self.session()?, &self.syntax, data, encoding, errors, newline)
            .await
    }

    /// Append `data` to the file, creating it if missing.
    pub async fn append_text(&self, data: &str, encoding: Option<&str>) -> PathResult<usize> {
        translate::append_text(&*self.session()?, &self.syntax, data, encoding).await
    }

    /// Replace a leading `~` or `~user` with the remote home directory.
    pub async fn expanduser(&self) -> PathResult<RemotePath> {
        let expanded = translate::expanduser(&*self.session()?, &self.syntax).await?;
        Ok(self.derive(expanded))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.syntax, f)
    }
}

impl fmt::Debug for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemotePath({}, {:?})", self.dialect(), self.syntax.to_string())
    }
}

impl PartialEq for RemotePath {
    fn eq(&self, other: &Self) -> bool {
        self.syntax == other.syntax
    }
}

impl Eq for RemotePath {}

impl Hash for RemotePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.syntax.hash(state);
    }
}

impl PartialOrd for RemotePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RemotePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.syntax.cmp(&other.syntax)
    }
}

impl PartialEq<PathSyntax> for RemotePath {
    fn eq(&self, other: &PathSyntax) -> bool {
        &self.syntax == other
    }
}
