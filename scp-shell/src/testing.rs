//! In-memory doubles for exercising the shell without a network or disk.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::backend::{EntryKind, Metadata};
use crate::console::Console;
use crate::errors::{ShellError, ShellResult};
use crate::host::{Filesystem, Host, Lines, resolve_relative};
use crate::shell::Shell;

enum Node {
    File(String),
    Dir,
}

#[derive(Default)]
struct State {
    tree: BTreeMap<String, Node>,
    cwd: Option<String>,
    lists: usize,
    chdir_failure: Option<String>,
    shell_fails: bool,
    downloads: Vec<(String, PathBuf)>,
}

/// A filesystem tree held in memory.  Clones share state, so a test can keep
/// one handle while the shell owns another.
#[derive(Clone, Default)]
pub struct MockFs {
    state: Rc<RefCell<State>>,
}

impl MockFs {
    pub fn new(cwd: &str) -> Self {
        let fs = Self::default().dir(cwd);
        fs.state.borrow_mut().cwd = Some(cwd.to_string());
        fs
    }

    /// A filesystem that does not know its working directory.
    pub fn without_cwd() -> Self {
        Self::default()
    }

    pub fn file(self, path: &str, contents: &str) -> Self {
        self.insert(path, Node::File(contents.to_string()));
        self
    }

    pub fn dir(self, path: &str) -> Self {
        self.insert(path, Node::Dir);
        self
    }

    fn insert(&self, path: &str, node: Node) {
        let mut state = self.state.borrow_mut();
        let mut parent = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            state.tree.entry(parent.clone()).or_insert(Node::Dir);
            parent = format!("{parent}/{component}");
        }
        state.tree.insert(path.to_string(), node);
    }

    fn absolute(&self, path: &str) -> String {
        let state = self.state.borrow();
        resolve_relative(state.cwd.as_deref().unwrap_or("/"), path)
    }

    /// The tree key for an absolute path; the root is stored as `""`.
    fn key(path: &str) -> &str {
        if path == "/" { "" } else { path }
    }
}

impl Filesystem for MockFs {
    fn cwd(&self) -> Option<String> {
        self.state.borrow().cwd.clone()
    }

    fn chdir(&mut self, path: &str) -> ShellResult<()> {
        if let Some(reason) = self.state.borrow().chdir_failure.clone() {
            return Err(ShellError::ConnectionFailed {
                host: "mock".into(),
                reason,
            });
        }

        let target = self.absolute(path);
        let mut state = self.state.borrow_mut();
        match state.tree.get(Self::key(&target)) {
            Some(Node::Dir) => {
                state.cwd = Some(target);
                Ok(())
            }
            Some(Node::File(_)) => Err(ShellError::NotADirectory(target)),
            None => Err(ShellError::NotFound(target)),
        }
    }

    fn list(&self) -> ShellResult<Vec<String>> {
        let mut state = self.state.borrow_mut();
        let Some(cwd) = state.cwd.clone() else {
            return Err(ShellError::RemoteError("no working directory".into()));
        };
        state.lists += 1;

        let prefix = format!("{}/", Self::key(&cwd));
        Ok(state
            .tree
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn stat(&self, path: &str) -> ShellResult<Metadata> {
        let target = self.absolute(path);
        let state = self.state.borrow();
        match state.tree.get(Self::key(&target)) {
            Some(Node::File(contents)) => Ok(Metadata {
                kind: EntryKind::File,
                size: contents.len() as u64,
                mode: 0o100644,
                ..Metadata::default()
            }),
            Some(Node::Dir) => Ok(Metadata {
                kind: EntryKind::Dir,
                size: 4096,
                mode: 0o40755,
                ..Metadata::default()
            }),
            None => Err(ShellError::NotFound(target)),
        }
    }

    fn open(&self, path: &str) -> ShellResult<Lines> {
        let target = self.absolute(path);
        let state = self.state.borrow();
        match state.tree.get(Self::key(&target)) {
            Some(Node::File(contents)) => {
                let lines: Vec<io::Result<String>> =
                    contents.lines().map(|l| Ok(l.to_string())).collect();
                Ok(Box::new(lines.into_iter()))
            }
            Some(Node::Dir) => Err(ShellError::RemoteError(format!("{target}: is a directory"))),
            None => Err(ShellError::NotFound(target)),
        }
    }
}

impl Host for MockFs {
    fn slug(&self) -> &str {
        "mock"
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> ShellResult<u64> {
        let size = self.stat(remote_path)?.size;
        self.state
            .borrow_mut()
            .downloads
            .push((remote_path.to_string(), local_path.to_path_buf()));
        Ok(size)
    }

    fn interactive_shell(&self) -> ShellResult<()> {
        if self.state.borrow().shell_fails {
            return Err(ShellError::ConnectionFailed {
                host: "mock".into(),
                reason: "ssh exited with status 255".into(),
            });
        }
        Ok(())
    }
}

/// A `Write` sink whose contents stay readable after it is handed away.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A shell over two [`MockFs`] trees, with handles for inspecting them.
pub struct TestShell {
    pub shell: Shell,
    remote: MockFs,
    local: MockFs,
    out: SharedBuffer,
}

impl TestShell {
    pub fn new(remote: MockFs, local: MockFs) -> Self {
        let out = SharedBuffer::default();
        let shell = Shell::new(Box::new(remote.clone()), Box::new(local.clone()))
            .with_output(Box::new(out.clone()))
            .with_console(Console::plain(80));
        Self {
            shell,
            remote,
            local,
            out,
        }
    }

    pub fn output(&self) -> String {
        self.out.contents()
    }

    /// The output sink, for tests that hand `shell` away.
    pub fn output_buffer(&self) -> SharedBuffer {
        self.out.clone()
    }

    /// Underlying remote listing fetches so far.
    pub fn remote_lists(&self) -> usize {
        self.remote.state.borrow().lists
    }

    pub fn local_lists(&self) -> usize {
        self.local.state.borrow().lists
    }

    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.remote.state.borrow().downloads.clone()
    }

    pub fn add_remote_file(&self, path: &str) {
        self.remote.insert(path, Node::File(String::new()));
    }

    /// Make every remote directory change fail as if the connection broke.
    pub fn fail_remote_chdir(&self, reason: &str) {
        self.remote.state.borrow_mut().chdir_failure = Some(reason.to_string());
    }

    pub fn fail_interactive_shell(&self) {
        self.remote.state.borrow_mut().shell_fails = true;
    }
}
