//! The remote side of the shell.
//!
//! [`Remote`] sits between the shell and a transport [`Backend`].  Its
//! responsibilities are:
//!
//! - Provide the **synchronous** [`Host`] interface the interactive loop
//!   consumes (internally it owns a single-threaded tokio runtime and
//!   blocks on backend futures).
//! - Track the remote working directory and resolve relative paths
//!   against it; the backend only ever sees absolute paths.
//! - Stat cache: metadata from `stat` and from directory listings is kept
//!   for a configurable TTL so that filtering a completion by entry kind
//!   right after listing a directory costs no further round-trips.  A miss
//!   for an entry of the working directory re-lists the directory once
//!   instead of stating entries one by one.
//! - File contents are pulled in [`CHUNK_SIZE`] pieces as the caller reads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Buf;

use crate::backend::ssh::{SshBackend, shell_escape};
use crate::backend::{Backend, DirEntry, Metadata};
use crate::config::Destination;
use crate::errors::{ShellError, ShellResult};
use crate::host::{Filesystem, Host, Lines, resolve_relative};

/// Bytes fetched per round-trip when reading a remote file.
pub const CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Stat cache
// ---------------------------------------------------------------------------

/// A single cached entry with its insertion timestamp.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// A TTL-based cache for stat results keyed by absolute remote path.
struct StatCache {
    entries: HashMap<String, CacheEntry<Metadata>>,
    ttl: Duration,
}

impl StatCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Get a cached entry if it exists and has not expired.
    fn get(&mut self, path: &str) -> Option<Metadata> {
        if let Some(entry) = self.entries.get(path) {
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
            // Expired, remove lazily.
            self.entries.remove(path);
        }
        None
    }

    fn insert(&mut self, path: String, value: Metadata) {
        self.entries.insert(path, CacheEntry::new(value));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// A connected remote host.
pub struct Remote {
    runtime: Arc<tokio::runtime::Runtime>,
    backend: Arc<dyn Backend>,
    destination: Destination,
    /// `None` when the login directory could not be determined.
    cwd: Option<String>,
    stat_cache: RefCell<StatCache>,
}

impl Remote {
    /// Open an SSH connection to `destination`.
    ///
    /// The working directory starts at the remote login directory, as
    /// reported by `pwd`.
    pub fn connect(destination: &Destination, stat_ttl: Duration) -> ShellResult<Self> {
        let runtime = new_runtime()?;
        let backend = runtime.block_on(SshBackend::connect(
            &destination.host,
            destination.user.as_deref(),
            destination.port,
        ))?;
        log::info!("connected: {}", backend.description());

        Ok(Self::from_parts(
            runtime,
            Arc::new(backend),
            destination.clone(),
            stat_ttl,
        ))
    }

    /// Wrap an already established backend.
    pub fn with_backend(
        backend: Arc<dyn Backend>,
        destination: Destination,
        stat_ttl: Duration,
    ) -> ShellResult<Self> {
        Ok(Self::from_parts(new_runtime()?, backend, destination, stat_ttl))
    }

    fn from_parts(
        runtime: tokio::runtime::Runtime,
        backend: Arc<dyn Backend>,
        destination: Destination,
        stat_ttl: Duration,
    ) -> Self {
        let mut remote = Self {
            runtime: Arc::new(runtime),
            backend,
            destination,
            cwd: None,
            stat_cache: RefCell::new(StatCache::new(stat_ttl)),
        };
        remote.cwd = remote.login_directory();
        remote
    }

    fn login_directory(&self) -> Option<String> {
        match self.runtime.block_on(self.backend.exec("pwd", &[])) {
            Ok(result) if result.exit_code == 0 => {
                let dir = String::from_utf8_lossy(&result.stdout).trim().to_string();
                (!dir.is_empty()).then_some(dir)
            }
            Ok(result) => {
                log::warn!(
                    "{}: `pwd` exited with {}, no remote working directory",
                    self.destination.host,
                    result.exit_code
                );
                None
            }
            Err(e) => {
                log::warn!("{}: could not determine login directory: {e}", self.destination.host);
                None
            }
        }
    }

    /// Resolve `path` against the working directory.
    fn absolute(&self, path: &str) -> String {
        resolve_relative(self.cwd.as_deref().unwrap_or("/"), path)
    }

    fn stat_absolute(&self, path: &str) -> ShellResult<Metadata> {
        if let Some(meta) = self.stat_cache.borrow_mut().get(path) {
            return Ok(meta);
        }

        let in_cwd = split_parent(path).filter(|(dir, _)| self.cwd.as_deref() == Some(*dir));
        if let Some((dir, name)) = in_cwd {
            match self.list_absolute(dir) {
                Ok(entries) => {
                    return entries
                        .into_iter()
                        .find(|entry| entry.name == name)
                        .map(|entry| entry.metadata)
                        .ok_or_else(|| ShellError::NotFound(path.to_string()));
                }
                Err(e) => log::debug!("re-listing {dir} failed, stating {path}: {e}"),
            }
        }

        let meta = self.runtime.block_on(self.backend.stat(path))?;
        self.stat_cache
            .borrow_mut()
            .insert(path.to_string(), meta.clone());
        Ok(meta)
    }

    /// List `dir` and refresh the stat cache for every entry.
    fn list_absolute(&self, dir: &str) -> ShellResult<Vec<DirEntry>> {
        let entries = self.runtime.block_on(self.backend.list(dir))?;
        let mut cache = self.stat_cache.borrow_mut();
        for entry in &entries {
            cache.insert(resolve_relative(dir, &entry.name), entry.metadata.clone());
        }
        Ok(entries)
    }
}

/// `(parent, name)` of an absolute path; `None` for the root.
fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

/// Pulls a remote file [`CHUNK_SIZE`] bytes at a time.
struct ChunkReader {
    runtime: Arc<tokio::runtime::Runtime>,
    backend: Arc<dyn Backend>,
    path: String,
    offset: u64,
    done: bool,
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let chunk = self
            .runtime
            .block_on(self.backend.read_range(&self.path, self.offset, buf.len()))
            .map_err(io::Error::other)?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.offset += n as u64;
        self.done = n == 0;
        Ok(n)
    }
}

impl Filesystem for Remote {
    fn cwd(&self) -> Option<String> {
        self.cwd.clone()
    }

    fn chdir(&mut self, path: &str) -> ShellResult<()> {
        let target = self.absolute(path);
        if !self.stat_absolute(&target)?.is_dir() {
            return Err(ShellError::NotADirectory(target));
        }
        log::debug!("remote cwd: {target}");
        self.cwd = Some(target);
        Ok(())
    }

    fn list(&self) -> ShellResult<Vec<String>> {
        let dir = self
            .cwd
            .as_deref()
            .ok_or_else(|| ShellError::RemoteError("no remote working directory".into()))?;
        let entries = self.list_absolute(dir)?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    fn stat(&self, path: &str) -> ShellResult<Metadata> {
        self.stat_absolute(&self.absolute(path))
    }

    /// The first chunk is fetched up front so a missing or unreadable file
    /// fails here; the rest is fetched as lines are pulled.
    fn open(&self, path: &str) -> ShellResult<Lines> {
        let path = self.absolute(path);
        let first = self
            .runtime
            .block_on(self.backend.read_range(&path, 0, CHUNK_SIZE))?;
        let rest = ChunkReader {
            runtime: self.runtime.clone(),
            backend: self.backend.clone(),
            offset: first.len() as u64,
            done: first.len() < CHUNK_SIZE,
            path,
        };
        let reader = BufReader::with_capacity(CHUNK_SIZE, first.reader().chain(rest));
        Ok(Box::new(reader.lines()))
    }
}

impl Host for Remote {
    fn slug(&self) -> &str {
        &self.destination.host
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> ShellResult<u64> {
        let data = self
            .runtime
            .block_on(self.backend.read(&self.absolute(remote_path)))?;
        std::fs::write(local_path, &data)?;
        Ok(data.len() as u64)
    }

    fn interactive_shell(&self) -> ShellResult<()> {
        let dir = self.cwd.as_deref().unwrap_or(".");
        let mut cmd = Command::new("ssh");
        cmd.arg("-t");
        if let Some(port) = self.destination.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(ref user) = self.destination.user {
            cmd.arg("-l").arg(user);
        }
        cmd.arg(&self.destination.host).arg(format!(
            "cd {} && exec \"${{SHELL:-/bin/sh}}\" -l",
            shell_escape(dir)
        ));

        let status = cmd.status().map_err(|e| ShellError::ConnectionFailed {
            host: self.destination.host.clone(),
            reason: e.to_string(),
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(ShellError::ConnectionFailed {
                host: self.destination.host.clone(),
                reason: format!("ssh exited with {status}"),
            })
        }
    }
}

fn new_runtime() -> ShellResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ShellError::Internal(format!("failed to create tokio runtime: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EntryKind, ExecResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An in-memory backend: absolute path → file contents (`None` for
    /// directories).
    struct FakeBackend {
        tree: Mutex<HashMap<String, Option<Vec<u8>>>>,
        home: Option<String>,
        stats: AtomicUsize,
        lists: AtomicUsize,
        reads: AtomicUsize,
    }

    impl FakeBackend {
        fn new(home: Option<&str>, tree: &[(&str, Option<&str>)]) -> Self {
            Self {
                tree: Mutex::new(
                    tree.iter()
                        .map(|(p, c)| (p.to_string(), c.map(|c| c.as_bytes().to_vec())))
                        .collect(),
                ),
                home: home.map(str::to_string),
                stats: AtomicUsize::new(0),
                lists: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            }
        }

        fn metadata(node: &Option<Vec<u8>>) -> Metadata {
            match node {
                None => Metadata {
                    kind: EntryKind::Dir,
                    mode: 0o40755,
                    ..Default::default()
                },
                Some(data) => Metadata {
                    kind: EntryKind::File,
                    size: data.len() as u64,
                    mode: 0o100644,
                    ..Default::default()
                },
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn read(&self, path: &str) -> ShellResult<Bytes> {
            match self.tree.lock().unwrap().get(path) {
                Some(Some(data)) => Ok(Bytes::from(data.clone())),
                _ => Err(ShellError::NotFound(path.to_string())),
            }
        }

        async fn read_range(&self, path: &str, offset: u64, len: usize) -> ShellResult<Bytes> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.tree.lock().unwrap().get(path) {
                Some(Some(data)) => {
                    let start = (offset as usize).min(data.len());
                    let end = start.saturating_add(len).min(data.len());
                    Ok(Bytes::copy_from_slice(&data[start..end]))
                }
                _ => Err(ShellError::NotFound(path.to_string())),
            }
        }

        async fn list(&self, path: &str) -> ShellResult<Vec<DirEntry>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            let tree = self.tree.lock().unwrap();
            let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
            Ok(tree
                .iter()
                .filter_map(|(p, node)| {
                    let rest = p.strip_prefix(&prefix)?;
                    (!rest.is_empty() && !rest.contains('/')).then(|| DirEntry {
                        name: rest.to_string(),
                        metadata: Self::metadata(node),
                    })
                })
                .collect())
        }

        async fn stat(&self, path: &str) -> ShellResult<Metadata> {
            self.stats.fetch_add(1, Ordering::SeqCst);
            self.tree
                .lock()
                .unwrap()
                .get(path)
                .map(Self::metadata)
                .ok_or_else(|| ShellError::NotFound(path.to_string()))
        }

        async fn exec(&self, cmd: &str, _args: &[&str]) -> ShellResult<ExecResult> {
            match (cmd, &self.home) {
                ("pwd", Some(home)) => Ok(ExecResult {
                    stdout: Bytes::from(format!("{home}\n")),
                    stderr: Bytes::new(),
                    exit_code: 0,
                }),
                _ => Ok(ExecResult {
                    stdout: Bytes::new(),
                    stderr: Bytes::from_static(b"not supported"),
                    exit_code: 1,
                }),
            }
        }

        fn description(&self) -> String {
            "fake".into()
        }
    }

    fn tree() -> Vec<(&'static str, Option<&'static str>)> {
        vec![
            ("/", None),
            ("/home", None),
            ("/home/a", None),
            ("/home/a/b.txt", Some("first\nsecond\n")),
            ("/home/a/sub", None),
        ]
    }

    fn remote(backend: Arc<FakeBackend>) -> Remote {
        remote_with_ttl(backend, Duration::from_secs(60))
    }

    fn remote_with_ttl(backend: Arc<FakeBackend>, ttl: Duration) -> Remote {
        let dest = Destination::parse("a@myvm").unwrap();
        Remote::with_backend(backend, dest, ttl).unwrap()
    }

    #[test]
    fn starts_in_login_directory() {
        let remote = remote(Arc::new(FakeBackend::new(Some("/home/a"), &tree())));
        assert_eq!(remote.cwd().as_deref(), Some("/home/a"));
        assert_eq!(remote.slug(), "myvm");
    }

    #[test]
    fn unknown_login_directory_leaves_cwd_unset() {
        let remote = remote(Arc::new(FakeBackend::new(None, &tree())));
        assert_eq!(remote.cwd(), None);
        assert!(remote.list().is_err());
    }

    #[test]
    fn chdir_resolves_relative_paths() {
        let mut remote = remote(Arc::new(FakeBackend::new(Some("/home/a"), &tree())));
        remote.chdir("sub").unwrap();
        assert_eq!(remote.cwd().as_deref(), Some("/home/a/sub"));
        remote.chdir("../..").unwrap();
        assert_eq!(remote.cwd().as_deref(), Some("/home"));
        remote.chdir("/").unwrap();
        assert_eq!(remote.cwd().as_deref(), Some("/"));
    }

    #[test]
    fn chdir_rejects_files_and_missing_paths() {
        let mut remote = remote(Arc::new(FakeBackend::new(Some("/home/a"), &tree())));
        assert!(matches!(
            remote.chdir("b.txt"),
            Err(ShellError::NotADirectory(_))
        ));
        assert!(matches!(remote.chdir("nope"), Err(ShellError::NotFound(_))));
        assert_eq!(remote.cwd().as_deref(), Some("/home/a"));
    }

    #[test]
    fn listing_primes_the_stat_cache() {
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &tree()));
        let remote = remote(backend.clone());

        let mut names = remote.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["b.txt", "sub"]);
        assert_eq!(remote.stat_cache.borrow().len(), 2);

        assert!(remote.stat("sub").unwrap().is_dir());
        assert!(remote.stat("b.txt").unwrap().is_file());
        assert_eq!(backend.stats.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stat_results_are_cached() {
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &tree()));
        let remote = remote(backend.clone());

        remote.stat("/home").unwrap();
        remote.stat("../../home").unwrap();
        assert_eq!(backend.stats.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entries_of_cwd_are_refreshed_by_one_listing() {
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &tree()));
        let remote = remote_with_ttl(backend.clone(), Duration::from_millis(200));

        remote.list().unwrap();
        std::thread::sleep(Duration::from_millis(300));

        assert!(remote.stat("b.txt").unwrap().is_file());
        assert!(remote.stat("sub").unwrap().is_dir());
        assert!(remote.stat("/home/a/b.txt").unwrap().is_file());
        assert_eq!(backend.lists.load(Ordering::SeqCst), 2);
        assert_eq!(backend.stats.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_entry_of_cwd_is_not_found_without_a_stat() {
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &tree()));
        let remote = remote(backend.clone());

        assert!(matches!(remote.stat("gone"), Err(ShellError::NotFound(p)) if p == "/home/a/gone"));
        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);
        assert_eq!(backend.stats.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn paths_outside_cwd_are_stated_directly() {
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &tree()));
        let remote = remote(backend.clone());

        assert!(remote.stat("sub/..").unwrap().is_dir());
        assert!(remote.stat("/").unwrap().is_dir());
        assert_eq!(backend.lists.load(Ordering::SeqCst), 0);
        assert_eq!(backend.stats.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn splits_parent_and_name() {
        assert_eq!(split_parent("/home/a/b.txt"), Some(("/home/a", "b.txt")));
        assert_eq!(split_parent("/home"), Some(("/", "home")));
        assert_eq!(split_parent("/"), None);
    }

    #[test]
    fn stat_cache_expires() {
        let mut cache = StatCache::new(Duration::from_millis(1));
        cache.insert("/tmp/file".into(), Metadata::default());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("/tmp/file").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn open_streams_lines() {
        let remote = remote(Arc::new(FakeBackend::new(Some("/home/a"), &tree())));
        let lines: Vec<String> = remote
            .open("b.txt")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines, vec!["first", "second"]);
        assert!(remote.open("missing").is_err());
    }

    #[test]
    fn open_pulls_chunks_only_as_lines_are_read() {
        let big: String = (0..30_000).map(|n| format!("line {n}\n")).collect();
        assert!(big.len() > 2 * CHUNK_SIZE);
        let nodes = [
            ("/", None),
            ("/home", None),
            ("/home/a", None),
            ("/home/a/big.log", Some(big.as_str())),
        ];
        let backend = Arc::new(FakeBackend::new(Some("/home/a"), &nodes));
        let remote = remote(backend.clone());

        let mut lines = remote.open("big.log").unwrap();
        assert_eq!(lines.next().unwrap().unwrap(), "line 0");
        drop(lines);
        assert_eq!(backend.reads.load(Ordering::SeqCst), 1);

        let all: Vec<String> = remote
            .open("big.log")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 30_000);
        assert_eq!(all[29_999], "line 29999");
        assert!(backend.reads.load(Ordering::SeqCst) > 3);
    }

    #[test]
    fn download_writes_local_file() {
        let remote = remote(Arc::new(FakeBackend::new(Some("/home/a"), &tree())));
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("b.txt");

        let written = remote.download("b.txt", &target).unwrap();
        assert_eq!(written, 13);
        assert_eq!(std::fs::read_to_string(target).unwrap(), "first\nsecond\n");
    }
}
