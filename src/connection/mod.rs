//! Connection capability.
//!
//! A [`Connection`] is the narrow interface the path engine needs from a
//! transport: run a command line, move raw bytes, and look up home
//! directories.  Establishing and authenticating the connection is the
//! caller's business; [`SshConnection`] and [`LocalConnection`] are the two
//! adapters shipped with the crate.

use async_trait::async_trait;
use bytes::Bytes;

use crate::dialect::Dialect;
use crate::errors::PathResult;

pub mod local;
pub mod ssh;

pub use local::LocalConnection;
pub use ssh::SshConnection;

// ---------------------------------------------------------------------------
// Types returned by connection operations
// ---------------------------------------------------------------------------

/// Result of running a command line via [`Connection::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output decoded lossily as UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8, trimmed.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

// ---------------------------------------------------------------------------
// Connection trait
// ---------------------------------------------------------------------------

/// A transport capable of executing remote command lines and moving raw
/// file contents.
///
/// Implementations must be shareable across tasks.  The path engine issues
/// one request at a time per operation but may be driven from several
/// tasks at once; serializing or multiplexing concurrent requests is the
/// implementation's job.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run `command` in the remote's native command interpreter and collect
    /// its output.  A non-zero exit status is not an error at this level.
    async fn execute(&self, command: &str) -> PathResult<ExecResult>;

    /// Read the entire contents of a remote file.
    async fn read_bytes(&self, path: &str) -> PathResult<Bytes>;

    /// Write `data` to a remote file, creating or truncating it.  Returns
    /// the number of bytes written.
    async fn write_bytes(&self, path: &str, data: Bytes) -> PathResult<usize>;

    /// Home directory of `user`, or of the connected user for `None`.
    async fn resolve_home(&self, user: Option<&str>) -> PathResult<String>;

    /// The dialect this connection already knows it speaks, if any.
    /// A hint is authoritative and skips probing.
    fn dialect_hint(&self) -> Option<Dialect> {
        None
    }

    /// A human-readable description used in log output.
    fn description(&self) -> String;
}
