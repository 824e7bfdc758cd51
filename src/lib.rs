//! Pathlib-style paths on remote POSIX, Windows and EFI-shell hosts.
//!
//! Hand a [`Connection`] to a [`Remote`]; it works out which dialect the far
//! side speaks and creates [`RemotePath`]s that know how to translate each
//! operation into that dialect's commands:
//!
//! - **posix**: `sh` command lines (`test`, `mkdir`, `mv`, `stat`, `iconv`)
//! - **windows**: PowerShell scripts over .NET `System.IO`, sent as
//!   `-EncodedCommand`
//! - **efi-shell**: UEFI shell built-ins (`ls`, `mkdir`, `rm`, `mv`, `attrib`)
//!
//! Remote failures are classified into one [`PathError`] taxonomy whatever
//! the dialect.
//!
//! ```no_run
//! use std::sync::Arc;
//! use remote_path::{Remote, SshConnection, TextErrors};
//!
//! # async fn demo() -> remote_path::PathResult<()> {
//! let conn = SshConnection::connect("build-host", Some("ci"), None).await?;
//! let remote = Remote::new(Arc::new(conn));
//!
//! let dir = remote.path("/tmp/a/b").await?;
//! dir.mkdir(0o777, true, true).await?;
//! let file = dir.child("notes.txt")?;
//! file.write_text("hello\n", None, TextErrors::Strict, None).await?;
//! assert_eq!(file.read_text(None, TextErrors::Strict).await?, "hello\n");
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod encoding;
pub mod errors;
pub mod path;
pub mod registry;
pub mod syntax;
pub mod translate;

pub use config::RemoteConfig;
pub use connection::{Connection, ExecResult, LocalConnection, SshConnection};
pub use dialect::Dialect;
pub use encoding::TextErrors;
pub use errors::{ErrorKind, PathError, PathResult};
pub use path::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, RemotePath};
pub use registry::{Remote, classify_probe, detect};
pub use syntax::{Anchor, PathSyntax};
pub use translate::{ChmodOutcome, OperationKind};
