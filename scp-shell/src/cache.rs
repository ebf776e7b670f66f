//! Per-session cache of remote directory listings, used by completion.
//!
//! Listings are keyed by the remote working directory they were taken in.
//! Nothing is ever evicted: a `cd` makes later lookups miss simply because
//! the key changes, and a directory whose contents change after it was
//! first listed keeps serving the old listing for the rest of the session.

use std::collections::HashMap;

use crate::errors::ShellResult;

#[derive(Debug, Default)]
pub struct DirCache {
    entries: HashMap<String, Vec<String>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the listing cached for `cwd`, calling `fetch` on a miss.
    ///
    /// An unknown or empty working directory yields an empty listing without
    /// fetching.  A failed fetch also yields an empty listing and is not
    /// cached, so the next completion tries again.
    pub fn get_or_fetch<F>(&mut self, cwd: Option<&str>, fetch: F) -> Vec<String>
    where
        F: FnOnce() -> ShellResult<Vec<String>>,
    {
        let Some(cwd) = cwd.filter(|c| !c.is_empty()) else {
            return Vec::new();
        };

        if let Some(names) = self.entries.get(cwd) {
            log::trace!("listing cache hit: {cwd}");
            return names.clone();
        }

        match fetch() {
            Ok(names) => {
                log::debug!("listing cache miss: {cwd} ({} entries)", names.len());
                self.entries.insert(cwd.to_string(), names.clone());
                names
            }
            Err(e) => {
                log::debug!("listing {cwd} for completion failed: {e}");
                Vec::new()
            }
        }
    }

    pub fn get(&self, cwd: &str) -> Option<&[String]> {
        self.entries.get(cwd).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
