//! Per-connection configuration.
//!
//! [`RemoteConfig`] implements [`serde::Deserialize`] so host applications
//! can embed it in their own configuration files; this crate never reads
//! files itself.

use serde::Deserialize;

use crate::dialect::Dialect;

/// Default probe: `uname` answers on POSIX, `ver` on `cmd.exe`.
pub const DEFAULT_PROBE_COMMAND: &str = "uname -s || ver";

/// Default PowerShell executable for the Windows dialect.
pub const DEFAULT_POWERSHELL: &str = "powershell";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Skip detection and use this dialect.
    pub dialect: Option<Dialect>,
    /// Executable used to run Windows scripts (`powershell` or `pwsh`).
    pub powershell: String,
    /// Command line sent to identify the remote when no dialect is known.
    pub probe_command: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            powershell: DEFAULT_POWERSHELL.to_string(),
            probe_command: DEFAULT_PROBE_COMMAND.to_string(),
        }
    }
}

impl RemoteConfig {
    /// Configuration that forces `dialect`.
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
            ..Self::default()
        }
    }
}
