//! `scp-shell`: an interactive shell for browsing a remote host over SSH and
//! copying files from it.
//!
//! Commands are resolved through a dispatch tree ([`handler`]) whose root is
//! the fixed command vocabulary ([`commands`]) and whose argument positions
//! are filled by entries of the remote or local working directory
//! ([`namespace`]).  The same tree serves tab completion and execution.

pub mod backend;
pub mod cache;
pub mod commands;
pub mod config;
pub mod console;
pub mod errors;
pub mod handler;
pub mod host;
pub mod local;
pub mod namespace;
pub mod remote;
pub mod repl;
pub mod shell;

#[cfg(test)]
mod testing;
