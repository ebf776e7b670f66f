//! The local side of the shell: the process working directory and `std::fs`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::backend::{EntryKind, Metadata};
use crate::errors::ShellResult;
use crate::host::{Filesystem, Lines};

/// The local filesystem, rooted at the process working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn cwd(&self) -> Option<String> {
        std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn chdir(&mut self, path: &str) -> ShellResult<()> {
        std::env::set_current_dir(path)?;
        Ok(())
    }

    fn list(&self) -> ShellResult<Vec<String>> {
        list_dir(Path::new("."))
    }

    fn stat(&self, path: &str) -> ShellResult<Metadata> {
        let meta = fs::metadata(path)?;
        Ok(metadata_from_std(&meta))
    }

    fn open(&self, path: &str) -> ShellResult<Lines> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file).lines()))
    }
}

/// Names of the entries in `dir`, in directory order.
fn list_dir(dir: &Path) -> ShellResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn metadata_from_std(meta: &fs::Metadata) -> Metadata {
    let file_type = meta.file_type();
    let kind = if file_type.is_dir() {
        EntryKind::Dir
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };

    Metadata {
        kind,
        size: meta.len(),
        modified: meta.modified().ok(),
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode(),
    }
}
