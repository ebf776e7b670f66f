//! Backend trait and the types it returns.
//!
//! A backend is the transport to the remote host.  It only understands
//! absolute paths; working-directory bookkeeping and caching live in
//! [`crate::remote::Remote`], which wraps a backend behind the synchronous
//! host interface the shell consumes.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::SystemTime;

use crate::errors::ShellResult;

pub mod ssh;

// ---------------------------------------------------------------------------
// Types returned by backend operations
// ---------------------------------------------------------------------------

/// The kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    #[default]
    File,
    Dir,
    Symlink,
}

/// Metadata for a path, on either side of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub uid: u32,
    pub gid: u32,
    /// Raw `st_mode`, file type bits included.
    pub mode: u32,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// A single entry returned by [`Backend::list`].
#[derive(Debug, Clone, Default)]
pub struct DirEntry {
    pub name: String,
    pub metadata: Metadata,
}

/// Result of running a command on the remote via [`Backend::exec`].
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i32,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A transport capable of remote file I/O and command execution.
///
/// All operations are async.  [`crate::remote::Remote`] owns the runtime and
/// blocks on these futures from the interactive loop.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the entire contents of a remote file.
    async fn read(&self, path: &str) -> ShellResult<Bytes>;

    /// Read up to `len` bytes starting at `offset`.  Fewer than `len` bytes
    /// are returned only at end of file.
    async fn read_range(&self, path: &str, offset: u64, len: usize) -> ShellResult<Bytes>;

    /// List the entries in a remote directory, excluding `.` and `..`.
    async fn list(&self, path: &str) -> ShellResult<Vec<DirEntry>>;

    /// Get metadata for a remote path.
    async fn stat(&self, path: &str) -> ShellResult<Metadata>;

    /// Execute a command on the remote and collect its output.
    async fn exec(&self, cmd: &str, args: &[&str]) -> ShellResult<ExecResult>;

    /// A human-readable description of this connection, for diagnostics.
    fn description(&self) -> String;
}
