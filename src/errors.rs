use std::fmt;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::translate::OperationKind;

/// The fieldless tag of a [`PathError`], handy for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotAFile,
    NotADirectory,
    NotEmpty,
    NoSuchParent,
    PermissionDenied,
    UnsupportedEncoding,
    DetectionFailed,
    RemoteOperationFailed,
    InvalidPath,
    ConnectionClosed,
    Unsupported,
    InvalidData,
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotAFile => "not a file",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::NotEmpty => "not empty",
            ErrorKind::NoSuchParent => "no such parent",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::UnsupportedEncoding => "unsupported encoding",
            ErrorKind::DetectionFailed => "detection failed",
            ErrorKind::RemoteOperationFailed => "remote operation failed",
            ErrorKind::InvalidPath => "invalid path",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidData => "invalid data",
            ErrorKind::Transport => "transport",
        };
        f.write_str(label)
    }
}

/// Dialect-independent failure of a remote path operation.
///
/// Variants produced from a remote result keep the original diagnostic
/// text so callers can log it.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote: no such file or directory: {path}")]
    NotFound { path: String, diagnostic: String },

    #[error("remote: already exists: {path}")]
    AlreadyExists { path: String, diagnostic: String },

    #[error("remote: not a file: {path}")]
    NotAFile { path: String, diagnostic: String },

    #[error("remote: not a directory: {path}")]
    NotADirectory { path: String, diagnostic: String },

    #[error("remote: directory not empty: {path}")]
    NotEmpty { path: String, diagnostic: String },

    #[error("remote: parent directory does not exist: {path}")]
    NoSuchParent { path: String, diagnostic: String },

    #[error("remote: permission denied: {path}")]
    PermissionDenied { path: String, diagnostic: String },

    #[error("encoding '{name}' is not supported by the {dialect} dialect")]
    UnsupportedEncoding { name: String, dialect: Dialect },

    #[error("could not detect the remote dialect from probe output {probe_output:?}")]
    DetectionFailed { probe_output: String },

    #[error("remote: command failed with exit code {exit_code}: {diagnostic}")]
    RemoteOperationFailed { exit_code: i32, diagnostic: String },

    #[error("invalid path {text:?}: {reason}")]
    InvalidPath { text: String, reason: String },

    #[error("the connection owning this path has been closed")]
    ConnectionClosed,

    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        operation: OperationKind,
        dialect: Dialect,
    },

    #[error("invalid text data: {0}")]
    InvalidData(String),

    #[error("transport: {0}")]
    Transport(String),
}

impl PathError {
    /// Build an error of the given `kind` for `path`, keeping `diagnostic`.
    ///
    /// Kinds that do not carry a path (encoding, detection, ...) fall back
    /// to [`PathError::RemoteOperationFailed`].
    pub fn from_kind(kind: ErrorKind, path: &str, diagnostic: impl Into<String>) -> Self {
        let path = path.to_string();
        let diagnostic = diagnostic.into();
        match kind {
            ErrorKind::NotFound => PathError::NotFound { path, diagnostic },
            ErrorKind::AlreadyExists => PathError::AlreadyExists { path, diagnostic },
            ErrorKind::NotAFile => PathError::NotAFile { path, diagnostic },
            ErrorKind::NotADirectory => PathError::NotADirectory { path, diagnostic },
            ErrorKind::NotEmpty => PathError::NotEmpty { path, diagnostic },
            ErrorKind::NoSuchParent => PathError::NoSuchParent { path, diagnostic },
            ErrorKind::PermissionDenied => PathError::PermissionDenied { path, diagnostic },
            ErrorKind::InvalidData => PathError::InvalidData(diagnostic),
            ErrorKind::Transport => PathError::Transport(diagnostic),
            _ => PathError::RemoteOperationFailed {
                exit_code: -1,
                diagnostic,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PathError::NotFound { .. } => ErrorKind::NotFound,
            PathError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            PathError::NotAFile { .. } => ErrorKind::NotAFile,
            PathError::NotADirectory { .. } => ErrorKind::NotADirectory,
            PathError::NotEmpty { .. } => ErrorKind::NotEmpty,
            PathError::NoSuchParent { .. } => ErrorKind::NoSuchParent,
            PathError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            PathError::UnsupportedEncoding { .. } => ErrorKind::UnsupportedEncoding,
            PathError::DetectionFailed { .. } => ErrorKind::DetectionFailed,
            PathError::RemoteOperationFailed { .. } => ErrorKind::RemoteOperationFailed,
            PathError::InvalidPath { .. } => ErrorKind::InvalidPath,
            PathError::ConnectionClosed => ErrorKind::ConnectionClosed,
            PathError::Unsupported { .. } => ErrorKind::Unsupported,
            PathError::InvalidData(_) => ErrorKind::InvalidData,
            PathError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// The raw remote diagnostic behind this error, if one was captured.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            PathError::NotFound { diagnostic, .. }
            | PathError::AlreadyExists { diagnostic, .. }
            | PathError::NotAFile { diagnostic, .. }
            | PathError::NotADirectory { diagnostic, .. }
            | PathError::NotEmpty { diagnostic, .. }
            | PathError::NoSuchParent { diagnostic, .. }
            | PathError::PermissionDenied { diagnostic, .. }
            | PathError::RemoteOperationFailed { diagnostic, .. } => Some(diagnostic),
            PathError::DetectionFailed { probe_output } => Some(probe_output),
            _ => None,
        }
    }

    pub(crate) fn invalid_path(text: &str, reason: impl Into<String>) -> Self {
        PathError::InvalidPath {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

pub type PathResult<T> = Result<T, PathError>;
