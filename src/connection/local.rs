//! Local connection adapter.
//!
//! Executes command lines on this machine via [`tokio::process::Command`]
//! (`sh -c` on unix, `cmd /C` on Windows) and moves bytes with
//! [`tokio::fs`].  Useful for loopback testing: the path engine cannot tell
//! it apart from a remote host of the same dialect.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use super::{Connection, ExecResult};
use crate::dialect::Dialect;
use crate::errors::{ErrorKind, PathError, PathResult};

/// Executes on the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnection;

impl LocalConnection {
    pub fn new() -> Self {
        LocalConnection
    }
}

fn shell_command(command: &str) -> tokio::process::Command {
    if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        // Diagnostics are classified by their untranslated text.
        cmd.arg("-c").arg(command).env("LC_ALL", "C");
        cmd
    }
}

fn io_error(e: io::Error, path: &str) -> PathError {
    let kind = match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::IsADirectory => ErrorKind::NotAFile,
        io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
        _ => return PathError::Transport(format!("{path}: {e}")),
    };
    PathError::from_kind(kind, path, e.to_string())
}

#[async_trait]
impl Connection for LocalConnection {
    async fn execute(&self, command: &str) -> PathResult<ExecResult> {
        trace!(command, "local exec");
        let output = shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PathError::Transport(format!("failed to spawn local shell: {e}")))?;

        Ok(ExecResult {
            stdout: Bytes::from(output.stdout),
            stderr: Bytes::from(output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn read_bytes(&self, path: &str) -> PathResult<Bytes> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| io_error(e, path))
    }

    async fn write_bytes(&self, path: &str, data: Bytes) -> PathResult<usize> {
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| io_error(e, path))?;
        Ok(data.len())
    }

    async fn resolve_home(&self, user: Option<&str>) -> PathResult<String> {
        if let Some(user) = user
            && !user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(PathError::invalid_path(
                &format!("~{user}"),
                "user name contains characters that cannot be expanded",
            ));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            PathError::from_kind(ErrorKind::NotFound, "~", "no home directory for this user")
        })?;
        let home = home.to_string_lossy().into_owned();
        let Some(user) = user else {
            return Ok(home);
        };

        if cfg!(windows) {
            return Ok(match home.rfind(['\\', '/']) {
                Some(idx) => format!("{}{user}", &home[..=idx]),
                None => user.to_string(),
            });
        }

        let result = self.execute(&format!("printf '%s' ~{user}")).await?;
        let expanded = result.stdout_text();
        if result.success() && expanded.starts_with('/') {
            Ok(expanded)
        } else {
            Err(PathError::from_kind(
                ErrorKind::NotFound,
                &format!("~{user}"),
                "unknown user",
            ))
        }
    }

    fn dialect_hint(&self) -> Option<Dialect> {
        if cfg!(windows) {
            Some(Dialect::Windows)
        } else {
            Some(Dialect::Posix)
        }
    }

    fn description(&self) -> String {
        "local".to_string()
    }
}
