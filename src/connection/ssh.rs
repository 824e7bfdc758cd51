//! SSH connection adapter.
//!
//! Uses the [`openssh`] crate (which shells out to the system's OpenSSH
//! binary) for command execution and [`openssh_sftp_client`] for byte
//! transfer when the remote offers the SFTP subsystem.
//!
//! Command lines are sent verbatim to the remote's login shell: `sh` on
//! POSIX hosts, `cmd.exe` or PowerShell on Windows OpenSSH.  Byte transfer
//! falls back to `cat` / `base64 -d` over exec when SFTP is unavailable,
//! which only works against POSIX shells.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use openssh::{KnownHosts, Session, SessionBuilder};
use openssh_sftp_client::{Sftp, SftpOptions};
use tracing::{debug, trace};

use super::{Connection, ExecResult};
use crate::classify::classify_message;
use crate::dialect::shell_escape;
use crate::errors::{ErrorKind, PathError, PathResult};

// ---------------------------------------------------------------------------
// SSH connection
// ---------------------------------------------------------------------------

/// A connection backed by a live [`openssh::Session`] and an optional
/// [`Sftp`] channel.
///
/// The session is wrapped in `Arc` so it can be shared between the exec
/// path and the SFTP subsystem (via `Sftp::from_clonable_session`).
pub struct SshConnection {
    session: Arc<Session>,
    /// `None` if the remote does not support the SFTP subsystem.
    sftp: Option<Sftp>,
    host: String,
    user: Option<String>,
    port: Option<u16>,
}

impl SshConnection {
    /// Open a new SSH connection to `host`, optionally as `user` and/or on a
    /// non-default `port`.
    ///
    /// Opening the SFTP channel is best-effort; without it the connection
    /// continues in exec-only mode.
    pub async fn connect(host: &str, user: Option<&str>, port: Option<u16>) -> PathResult<Self> {
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);

        if let Some(user) = user {
            builder.user(user.to_string());
        }
        if let Some(port) = port {
            builder.port(port);
        }

        let session = builder
            .connect(host)
            .await
            .map_err(|e| PathError::Transport(format!("{host}: connection failed: {e}")))?;
        let session = Arc::new(session);

        let sftp = Sftp::from_clonable_session(session.clone(), SftpOptions::default())
            .await
            .ok();
        debug!(host, sftp = sftp.is_some(), "ssh connection established");

        Ok(Self {
            session,
            sftp,
            host: host.to_string(),
            user: user.map(str::to_string),
            port,
        })
    }

    /// Whether this connection has an active SFTP channel.
    pub fn has_sftp(&self) -> bool {
        self.sftp.is_some()
    }

    fn transport_error(&self, e: impl std::fmt::Display) -> PathError {
        PathError::Transport(format!("{}: {e}", self.host))
    }

    /// Turn a failed exec-fallback transfer into a classified error.
    fn check_result(result: &ExecResult, path: &str) -> PathResult<()> {
        if result.success() {
            return Ok(());
        }
        let msg = result.stderr_text();
        if msg.is_empty() {
            return Err(PathError::RemoteOperationFailed {
                exit_code: result.exit_code,
                diagnostic: format!("transfer of {path} failed"),
            });
        }
        Err(match classify_message(&msg, path) {
            PathError::Transport(diagnostic) => PathError::RemoteOperationFailed {
                exit_code: result.exit_code,
                diagnostic,
            },
            classified => classified,
        })
    }

    // -----------------------------------------------------------------------
    // Exec-based transfer (fallback)
    // -----------------------------------------------------------------------

    async fn read_exec(&self, path: &str) -> PathResult<Bytes> {
        let result = self.execute(&format!("cat {}", shell_escape(path))).await?;
        Self::check_result(&result, path)?;
        Ok(result.stdout)
    }

    async fn write_exec(&self, path: &str, data: Bytes) -> PathResult<usize> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        let script = format!(
            "base64 -d > {} <<'__REMOTE_PATH_EOF__'\n{encoded}\n__REMOTE_PATH_EOF__",
            shell_escape(path)
        );
        let result = self.execute(&script).await?;
        Self::check_result(&result, path)?;
        Ok(data.len())
    }

    // -----------------------------------------------------------------------
    // SFTP-based transfer (fast path)
    // -----------------------------------------------------------------------

    async fn read_sftp(sftp: &Sftp, path: &str) -> PathResult<Bytes> {
        let mut fs = sftp.fs();
        let data = fs
            .read(path)
            .await
            .map_err(|e| classify_message(&e.to_string(), path))?;
        Ok(data.freeze())
    }

    async fn write_sftp(sftp: &Sftp, path: &str, data: &Bytes) -> PathResult<usize> {
        let mut fs = sftp.fs();
        fs.write(path, &data[..])
            .await
            .map_err(|e| classify_message(&e.to_string(), path))?;
        Ok(data.len())
    }

    /// Home lookup through `cmd.exe`, used when the POSIX form fails.
    async fn resolve_home_windows(&self, user: Option<&str>) -> PathResult<String> {
        let result = self.execute("echo %USERPROFILE%").await?;
        let profile = result.stdout_text().trim().to_string();
        if !result.success() || profile.is_empty() || profile.contains('%') {
            return Err(PathError::RemoteOperationFailed {
                exit_code: result.exit_code,
                diagnostic: format!("could not resolve home directory on {}", self.host),
            });
        }
        match user {
            None => Ok(profile),
            // Other users' profiles live beside ours.
            Some(user) => match profile.rfind(['\\', '/']) {
                Some(idx) => Ok(format!("{}{user}", &profile[..=idx])),
                None => Ok(user.to_string()),
            },
        }
    }
}

/// User names we are willing to place after `~` unquoted.
fn is_plain_user_name(user: &str) -> bool {
    !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// ---------------------------------------------------------------------------
// Connection trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Connection for SshConnection {
    async fn execute(&self, command: &str) -> PathResult<ExecResult> {
        trace!(host = %self.host, command, "ssh exec");
        let output = self
            .session
            .raw_command(command)
            .output()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(ExecResult {
            stdout: Bytes::from(output.stdout),
            stderr: Bytes::from(output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn read_bytes(&self, path: &str) -> PathResult<Bytes> {
        if let Some(ref sftp) = self.sftp {
            match Self::read_sftp(sftp, path).await {
                Ok(data) => return Ok(data),
                // Channel trouble rather than a file problem: use exec.
                Err(PathError::Transport(reason)) => {
                    debug!(path, %reason, "sftp read failed, falling back to exec");
                }
                Err(e) => return Err(e),
            }
        }
        self.read_exec(path).await
    }

    async fn write_bytes(&self, path: &str, data: Bytes) -> PathResult<usize> {
        if let Some(ref sftp) = self.sftp {
            match Self::write_sftp(sftp, path, &data).await {
                Ok(n) => return Ok(n),
                Err(PathError::Transport(reason)) => {
                    debug!(path, %reason, "sftp write failed, falling back to exec");
                }
                Err(e) => return Err(e),
            }
        }
        self.write_exec(path, data).await
    }

    async fn resolve_home(&self, user: Option<&str>) -> PathResult<String> {
        let tilde = match user {
            None => "~".to_string(),
            Some(user) if is_plain_user_name(user) => format!("~{user}"),
            Some(user) => {
                return Err(PathError::invalid_path(
                    &format!("~{user}"),
                    "user name contains characters that cannot be expanded",
                ));
            }
        };

        let result = self.execute(&format!("printf '%s' {tilde}")).await?;
        let home = result.stdout_text();
        if result.success() && home.starts_with('/') {
            return Ok(home);
        }
        if result.success() && home == tilde {
            // The shell left `~user` alone: no such user.
            return Err(PathError::from_kind(
                ErrorKind::NotFound,
                &tilde,
                "unknown user",
            ));
        }
        self.resolve_home_windows(user).await
    }

    fn description(&self) -> String {
        let mut desc = String::from("ssh://");
        if let Some(ref user) = self.user {
            desc.push_str(user);
            desc.push('@');
        }
        desc.push_str(&self.host);
        if let Some(port) = self.port {
            desc.push_str(&format!(":{port}"));
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_user_names() {
        assert!(is_plain_user_name("alice"));
        assert!(is_plain_user_name("svc-build.1"));
        assert!(!is_plain_user_name(""));
        assert!(!is_plain_user_name("a;rm -rf /"));
        assert!(!is_plain_user_name("bob smith"));
    }

    #[test]
    fn check_result_classifies_stderr() {
        let result = ExecResult {
            stdout: Bytes::new(),
            stderr: Bytes::from_static(b"cat: /nope: No such file or directory\n"),
            exit_code: 1,
        };
        let err = SshConnection::check_result(&result, "/nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn check_result_unknown_failure_is_remote_failure() {
        let result = ExecResult {
            stdout: Bytes::new(),
            stderr: Bytes::from_static(b"base64: invalid input"),
            exit_code: 1,
        };
        let err = SshConnection::check_result(&result, "/f").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteOperationFailed);
    }
}
