//! Filesystem-backed namespaces: one leaf per entry of a working directory.
//!
//! The same [`EntryNamespace`] serves remote files, remote directories,
//! local files and local directories.  What differs is the [`EntrySource`]
//! (how entries are listed and classified) and the [`EntryFilter`].
//!
//! Resolution never checks that an entry exists.  A bad name surfaces when
//! the leaf runs and the underlying operation fails.

use crate::handler::{Completions, Handler, HandlerType, Leaf, Namespace};
use crate::host::Filesystem;
use crate::shell::Shell;

/// The filesystem root, offered by every namespace that admits directories.
pub const ROOT: &str = "/";

/// Which entries a namespace offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFilter {
    pub files_only: bool,
    pub directories_only: bool,
}

impl EntryFilter {
    pub const ANY: Self = Self {
        files_only: false,
        directories_only: false,
    };
    pub const FILES: Self = Self {
        files_only: true,
        directories_only: false,
    };
    pub const DIRECTORIES: Self = Self {
        files_only: false,
        directories_only: true,
    };

    fn admits(self, source: &EntrySource, shell: &Shell, name: &str) -> bool {
        if self.files_only && !(source.is_file)(shell, name) {
            return false;
        }
        if self.directories_only && !(source.is_dir)(shell, name) {
            return false;
        }
        true
    }
}

/// How to enumerate and classify the entries of one side of the connection.
pub struct EntrySource {
    pub list: fn(&mut Shell) -> Vec<String>,
    pub is_file: fn(&Shell, &str) -> bool,
    pub is_dir: fn(&Shell, &str) -> bool,
}

/// Remote entries; listings go through the session's directory cache.
pub static REMOTE: EntrySource = EntrySource {
    list: Shell::remote_listing,
    is_file: |shell, name| shell.host().stat(name).is_ok_and(|m| m.is_file()),
    is_dir: |shell, name| shell.host().stat(name).is_ok_and(|m| m.is_dir()),
};

/// Local entries; listed fresh on every completion.
pub static LOCAL: EntrySource = EntrySource {
    list: Shell::local_listing,
    is_file: |shell, name| shell.local().stat(name).is_ok_and(|m| m.is_file()),
    is_dir: |shell, name| shell.local().stat(name).is_ok_and(|m| m.is_dir()),
};

/// A branch whose children are the entries of a working directory, each
/// bound to `action`.
pub struct EntryNamespace {
    handler_type: HandlerType,
    filter: EntryFilter,
    source: &'static EntrySource,
    action: fn(&mut Shell, &str),
}

impl EntryNamespace {
    pub fn new(
        handler_type: HandlerType,
        filter: EntryFilter,
        source: &'static EntrySource,
        action: fn(&mut Shell, &str),
    ) -> Self {
        Self {
            handler_type,
            filter,
            source,
            action,
        }
    }

    fn leaf(&self, path: String) -> Handler {
        Handler::Leaf(Leaf::bound(self.handler_type, self.action, path))
    }
}

impl Namespace for EntryNamespace {
    fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    fn complete<'a>(&'a self, shell: &'a mut Shell, part: &'a str) -> Completions<'a> {
        let names = (self.source.list)(shell);
        let shell: &'a Shell = shell;

        let entries = names
            .into_iter()
            .filter(move |name| name.starts_with(part))
            .filter(move |name| self.filter.admits(self.source, shell, name))
            .map(move |name| (name.clone(), self.leaf(name)));

        let root = (!self.filter.files_only && ROOT.starts_with(part))
            .then(|| (ROOT.to_string(), self.leaf(ROOT.to_string())));

        Box::new(entries.chain(root))
    }

    fn resolve(&self, _shell: &Shell, name: &str) -> Option<Handler> {
        Some(self.leaf(name.to_string()))
    }
}

/// A namespace over remote working-directory entries.
pub fn remote_handler(filter: EntryFilter, action: fn(&mut Shell, &str)) -> EntryNamespace {
    EntryNamespace::new(HandlerType::Remote, filter, &REMOTE, action)
}

/// A namespace over local working-directory entries.
pub fn local_handler(filter: EntryFilter, action: fn(&mut Shell, &str)) -> EntryNamespace {
    EntryNamespace::new(HandlerType::Local, filter, &LOCAL, action)
}
