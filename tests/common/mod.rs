//! Scripted stand-in for a remote connection.
//!
//! Every call is recorded.  `execute` is answered by a closure supplied by
//! the test; PowerShell `-EncodedCommand` lines are decoded first so both
//! the closure and the recorded calls see the plain script.  Byte transfer
//! is served from an in-memory file map.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use remote_path::{Connection, Dialect, ErrorKind, ExecResult, PathError, PathResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(String),
    Read(String),
    Write(String, Vec<u8>),
    ResolveHome(Option<String>),
}

type Responder = Box<dyn Fn(&str) -> ExecResult + Send + Sync>;

pub struct StubConnection {
    hint: Option<Dialect>,
    responder: Responder,
    calls: Mutex<Vec<Call>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    home: String,
}

impl StubConnection {
    pub fn new(
        hint: Option<Dialect>,
        responder: impl Fn(&str) -> ExecResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_home(hint, "/home/tester", responder)
    }

    pub fn with_home(
        hint: Option<Dialect>,
        home: &str,
        responder: impl Fn(&str) -> ExecResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            hint,
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            home: home.to_string(),
        })
    }

    /// A stub whose every command succeeds silently.
    pub fn silent(hint: Option<Dialect>) -> Arc<Self> {
        Self::new(hint, |_| ok(""))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Executed command lines (decoded scripts for PowerShell).
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Connection for StubConnection {
    async fn execute(&self, command: &str) -> PathResult<ExecResult> {
        let command = decode_powershell(command).unwrap_or_else(|| command.to_string());
        self.record(Call::Execute(command.clone()));
        Ok((self.responder)(&command))
    }

    async fn read_bytes(&self, path: &str) -> PathResult<Bytes> {
        self.record(Call::Read(path.to_string()));
        match self.file(path) {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(PathError::from_kind(
                ErrorKind::NotFound,
                path,
                "no such file in stub",
            )),
        }
    }

    async fn write_bytes(&self, path: &str, data: Bytes) -> PathResult<usize> {
        self.record(Call::Write(path.to_string(), data.to_vec()));
        self.put_file(path, &data);
        Ok(data.len())
    }

    async fn resolve_home(&self, user: Option<&str>) -> PathResult<String> {
        self.record(Call::ResolveHome(user.map(str::to_string)));
        Ok(match user {
            None => self.home.clone(),
            Some(user) => {
                let sep = if self.home.contains('\\') { '\\' } else { '/' };
                match self.home.rfind(sep) {
                    Some(idx) => format!("{}{user}", &self.home[..=idx]),
                    None => user.to_string(),
                }
            }
        })
    }

    fn dialect_hint(&self) -> Option<Dialect> {
        self.hint
    }

    fn description(&self) -> String {
        "stub".to_string()
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

pub fn ok(stdout: &str) -> ExecResult {
    ExecResult {
        stdout: Bytes::from(stdout.to_string()),
        stderr: Bytes::new(),
        exit_code: 0,
    }
}

pub fn fail(exit_code: i32, stderr: &str) -> ExecResult {
    ExecResult {
        stdout: Bytes::new(),
        stderr: Bytes::from(stderr.to_string()),
        exit_code,
    }
}

/// Clean negative from `test`.
pub fn no() -> ExecResult {
    fail(1, "")
}

/// Standard output and status only, the way the EFI shell answers.
pub fn efi(exit_code: i32, stdout: &str) -> ExecResult {
    ExecResult {
        stdout: Bytes::from(stdout.to_string()),
        stderr: Bytes::new(),
        exit_code,
    }
}

// ---------------------------------------------------------------------------
// PowerShell helpers
// ---------------------------------------------------------------------------

/// The script inside a `-EncodedCommand` line.
pub fn decode_powershell(command: &str) -> Option<String> {
    let (_, encoded) = command.split_once(" -EncodedCommand ")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// The text carried by a `FromBase64String('...')` payload in a script.
pub fn payload_text(script: &str) -> Option<String> {
    let start = script.find("FromBase64String('")? + "FromBase64String('".len();
    let end = script[start..].find('\'')? + start;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&script[start..end])
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// `text` the way the read script prints it.
pub fn base64_utf8(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

// ---------------------------------------------------------------------------
// Fake POSIX tree
// ---------------------------------------------------------------------------

/// A directory tree answering the `sh` command lines the POSIX translator
/// emits, with the diagnostics GNU coreutils prints.
pub struct PosixTree {
    dirs: Mutex<BTreeSet<String>>,
    files: Mutex<BTreeSet<String>>,
}

impl PosixTree {
    pub fn new(dirs: &[&str], files: &[&str]) -> Arc<Self> {
        let mut all_dirs: BTreeSet<String> = dirs.iter().map(|d| d.to_string()).collect();
        all_dirs.insert("/".to_string());
        Arc::new(Self {
            dirs: Mutex::new(all_dirs),
            files: Mutex::new(files.iter().map(|f| f.to_string()).collect()),
        })
    }

    /// A stub connection backed by this tree.
    pub fn connect(self: &Arc<Self>) -> Arc<StubConnection> {
        let tree = Arc::clone(self);
        StubConnection::new(Some(Dialect::Posix), move |cmd| tree.respond(cmd))
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.has_dir(path) || self.has_file(path)
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let dirs = self.dirs.lock().unwrap();
        let files = self.files.lock().unwrap();
        dirs.iter().chain(files.iter()).any(|p| p.starts_with(&prefix))
    }

    pub fn respond(&self, command: &str) -> ExecResult {
        let ops = quoted_operands(command);
        let first = ops.first().cloned().unwrap_or_default();

        if let Some(rest) = command.strip_prefix("test ") {
            let yes = match &rest[..2] {
                "-e" => self.exists(&first),
                "-f" => self.has_file(&first),
                "-d" => self.has_dir(&first),
                _ => return fail(2, "test: unknown operator"),
            };
            return if yes { ok("") } else { no() };
        }
        if command.starts_with("mkdir") {
            if self.exists(&first) {
                return fail(1, &format!("mkdir: cannot create directory '{first}': File exists"));
            }
            if command.starts_with("mkdir -p") {
                let blocked = ancestors_of(&first).into_iter().any(|a| self.has_file(&a));
                if blocked {
                    return fail(
                        1,
                        &format!("mkdir: cannot create directory '{first}': Not a directory"),
                    );
                }
                let mut dirs = self.dirs.lock().unwrap();
                let mut current = String::new();
                for part in first.split('/').filter(|p| !p.is_empty()) {
                    current = format!("{current}/{part}");
                    dirs.insert(current.clone());
                }
                return ok("");
            }
            if !self.has_dir(&parent_of(&first)) {
                return fail(
                    1,
                    &format!("mkdir: cannot create directory '{first}': No such file or directory"),
                );
            }
            self.dirs.lock().unwrap().insert(first);
            return ok("");
        }
        if command.starts_with("rmdir ") {
            if !self.has_dir(&first) {
                return fail(1, &format!("rmdir: failed to remove '{first}': No such file or directory"));
            }
            if self.has_children(&first) {
                return fail(1, &format!("rmdir: failed to remove '{first}': Directory not empty"));
            }
            self.dirs.lock().unwrap().remove(&first);
            return ok("");
        }
        if command.starts_with("rm ") {
            if !self.files.lock().unwrap().remove(&first) {
                return fail(1, &format!("rm: cannot remove '{first}': No such file or directory"));
            }
            return ok("");
        }
        if command.starts_with("mv -f -T ") {
            let dst = ops.get(1).cloned().unwrap_or_default();
            if self.files.lock().unwrap().remove(&first) {
                self.files.lock().unwrap().insert(dst);
                return ok("");
            }
            if self.dirs.lock().unwrap().remove(&first) {
                self.dirs.lock().unwrap().insert(dst);
                return ok("");
            }
            return fail(1, &format!("mv: cannot stat '{first}': No such file or directory"));
        }
        if command.starts_with("( set -C; : > ") {
            if self.exists(&first) {
                return fail(2, &format!("sh: 1: cannot create {first}: File exists"));
            }
            if !self.has_dir(&parent_of(&first)) {
                return fail(2, &format!("sh: 1: cannot create {first}: Directory nonexistent"));
            }
            self.files.lock().unwrap().insert(first);
            return ok("");
        }
        if command.starts_with("chmod ") {
            if !self.exists(&first) {
                return fail(
                    1,
                    &format!("chmod: cannot access '{first}': No such file or directory"),
                );
            }
            return ok("");
        }
        fail(127, &format!("sh: 1: unexpected command: {command}"))
    }
}

/// Every proper ancestor of `path`, nearest first.
fn ancestors_of(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path.to_string();
    while current != "/" {
        current = parent_of(&current);
        out.push(current.clone());
    }
    out
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Contents of each single-quoted operand in a command line.
pub fn quoted_operands(command: &str) -> Vec<String> {
    command
        .split('\'')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}
