//! Dialect registry and path factory.
//!
//! [`Remote`] owns a connection together with its detected [`Dialect`].
//! Detection runs at most once per `Remote` (memoized in a
//! [`tokio::sync::OnceCell`]); every path created from it shares the result.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::RemoteConfig;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::errors::{PathError, PathResult};
use crate::path::RemotePath;
use crate::syntax::PathSyntax;
use crate::translate::OperationKind;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Kernel names `uname -s` reports on POSIX systems.
const POSIX_KERNELS: &[&str] = &[
    "Linux",
    "Darwin",
    "FreeBSD",
    "OpenBSD",
    "NetBSD",
    "DragonFly",
    "SunOS",
    "AIX",
    "HP-UX",
    "VMkernel",
    "GNU",
    "Haiku",
];

/// Errors PowerShell prints when it is the login shell: Windows
/// PowerShell 5 cannot parse `||`, PowerShell 7 has no `ver`.
const POWERSHELL_SIGNATURES: &[&str] = &[
    "is not a valid statement separator",
    "is not recognized as the name of a cmdlet",
    "is not recognized as a name of a cmdlet",
];

/// Prefixes of POSIX layers on Windows (`CYGWIN_NT-10.0`, ...).
const POSIX_KERNEL_FAMILIES: &[&str] = &["CYGWIN", "MINGW", "MSYS"];

/// Classify probe output by signature.
///
/// Windows and EFI banners are checked before kernel names so a Windows
/// host answering `ver` after a failed `uname` is not misread.
pub fn classify_probe(output: &str) -> Option<Dialect> {
    if output.contains("Microsoft Windows")
        || output.contains("Windows_NT")
        || POWERSHELL_SIGNATURES.iter().any(|s| output.contains(s))
    {
        return Some(Dialect::Windows);
    }
    if output.contains("UEFI") || output.contains("EFI Shell") {
        return Some(Dialect::EfiShell);
    }
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|word| {
            POSIX_KERNELS.contains(&word)
                || POSIX_KERNEL_FAMILIES
                    .iter()
                    .any(|family| word.starts_with(family))
        })
        .then_some(Dialect::Posix)
}

/// Determine the dialect of `connection`.
///
/// An override in `config` wins, then the connection's own hint; only
/// when neither is present is the probe command sent.
pub async fn detect(connection: &dyn Connection, config: &RemoteConfig) -> PathResult<Dialect> {
    let target = connection.description();
    if let Some(dialect) = config.dialect {
        debug!(connection = %target, %dialect, "dialect set by configuration");
        return Ok(dialect);
    }
    if let Some(dialect) = connection.dialect_hint() {
        debug!(connection = %target, %dialect, "dialect hinted by connection");
        return Ok(dialect);
    }

    let result = connection.execute(&config.probe_command).await?;
    let mut output = result.stdout_text();
    let stderr = result.stderr_text();
    if !stderr.is_empty() {
        output.push('\n');
        output.push_str(&stderr);
    }
    match classify_probe(&output) {
        Some(dialect) => {
            info!(connection = %target, %dialect, "dialect detected");
            Ok(dialect)
        }
        None => Err(PathError::DetectionFailed {
            probe_output: output.trim().to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A connection plus its memoized dialect and configuration.
pub(crate) struct Session {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) config: RemoteConfig,
    dialect: OnceCell<Dialect>,
}

/// Entry point: wraps a connection and hands out [`RemotePath`]s.
///
/// Paths hold only a weak reference to the session, so once every clone of
/// the `Remote` is dropped their operations fail with
/// [`PathError::ConnectionClosed`].
#[derive(Clone)]
pub struct Remote {
    session: Arc<Session>,
}

impl Remote {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_config(connection, RemoteConfig::default())
    }

    pub fn with_config(connection: Arc<dyn Connection>, config: RemoteConfig) -> Self {
        Self {
            session: Arc::new(Session {
                connection,
                config,
                dialect: OnceCell::new(),
            }),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.session.connection
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.session.config
    }

    /// The connection's dialect, detecting it on first use.
    pub async fn dialect(&self) -> PathResult<Dialect> {
        let session = &self.session;
        session
            .dialect
            .get_or_try_init(|| detect(session.connection.as_ref(), &session.config))
            .await
            .copied()
    }

    /// Parse `text` in this connection's dialect.
    pub async fn path(&self, text: &str) -> PathResult<RemotePath> {
        let dialect = self.dialect().await?;
        let syntax = PathSyntax::parse(dialect, text)?;
        Ok(RemotePath::new(syntax, Arc::downgrade(&self.session)))
    }

    /// Home directory of `user`, or of the connected user for `None`.
    pub async fn home(&self, user: Option<&str>) -> PathResult<RemotePath> {
        let dialect = self.dialect().await?;
        if dialect == Dialect::EfiShell {
            return Err(PathError::Unsupported {
                operation: OperationKind::Expanduser,
                dialect,
            });
        }
        let home = self.session.connection.resolve_home(user).await?;
        self.path(&home).await
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("connection", &self.session.connection.description())
            .field("dialect", &self.session.dialect.get())
            .finish()
    }
}
