//! The capability interfaces the shell consumes.
//!
//! [`Filesystem`] is the shape shared by both sides of the connection: a
//! working directory, a listing of it, metadata, and line-wise reads.
//! [`Host`] adds what only the remote side offers.  The shell is written
//! entirely against these traits; [`crate::remote::Remote`] and
//! [`crate::local::LocalFs`] are the production implementations.

use std::io;
use std::path::Path;

use crate::backend::Metadata;
use crate::errors::ShellResult;

/// A finite, non-restartable sequence of text lines read from a file.
///
/// The underlying handle is released when the sequence is dropped, whether
/// it was read to the end or abandoned early.
pub type Lines = Box<dyn Iterator<Item = io::Result<String>>>;

pub trait Filesystem {
    /// The current working directory, if one is known.
    fn cwd(&self) -> Option<String>;

    /// Change the working directory.  Relative paths resolve against the
    /// current one.
    fn chdir(&mut self, path: &str) -> ShellResult<()>;

    /// Names of the entries in the working directory.
    fn list(&self) -> ShellResult<Vec<String>>;

    /// Metadata for `path`, relative to the working directory unless absolute.
    fn stat(&self, path: &str) -> ShellResult<Metadata>;

    /// Open `path` for line-wise reading.
    fn open(&self, path: &str) -> ShellResult<Lines>;
}

pub trait Host: Filesystem {
    /// Short identifier of the remote end, shown in the prompt.
    fn slug(&self) -> &str;

    /// Copy `remote_path` to `local_path`, returning the number of bytes written.
    fn download(&self, remote_path: &str, local_path: &Path) -> ShellResult<u64>;

    /// Hand the terminal over to an interactive login shell on the remote,
    /// started in the current remote working directory.  Returns once that
    /// shell exits.
    fn interactive_shell(&self) -> ShellResult<()>;
}

/// Resolve a relative path against a base directory.
///
/// - Absolute paths (starting with `/`) are normalized and returned.
/// - `..` and `.` components are handled.
/// - The result is always a clean absolute path.
pub fn resolve_relative(base: &str, relative: &str) -> String {
    let mut components: Vec<&str> = if relative.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|c| !c.is_empty()).collect()
    };

    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}

/// The last component of a path; empty for `/` and the empty string.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
