//! The command vocabulary and the root namespace that serves it.
//!
//! Every action here is infallible from the caller's point of view: errors
//! are reported on the session output as `ERROR: <message>` and the shell
//! carries on.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::backend::Metadata;
use crate::console::in_columns;
use crate::errors::{ShellError, ShellResult};
use crate::handler::{Completions, Handler, HandlerType, Leaf, Namespace};
use crate::host::{Filesystem, Host, basename};
use crate::namespace::{EntryFilter, EntryNamespace, LOCAL, REMOTE, local_handler, remote_handler};
use crate::shell::Shell;

/// One entry of the root namespace.
pub struct Command {
    pub name: &'static str,
    pub build: fn() -> Handler,
}

/// The fixed command vocabulary, in display order.
pub static COMMANDS: &[Command] = &[
    Command { name: "clear", build: || builtin(clear) },
    Command { name: "exit", build: || builtin(exit) },
    Command { name: "connect", build: || builtin(connect) },
    Command { name: "ls", build: || leaf(HandlerType::Remote, ls) },
    Command {
        name: "cd",
        build: || branch(remote_handler(EntryFilter::DIRECTORIES, cd)),
    },
    Command { name: "pwd", build: || leaf(HandlerType::Remote, pwd) },
    Command {
        name: "stat",
        build: || branch(remote_handler(EntryFilter::ANY, stat)),
    },
    Command {
        name: "display",
        build: || branch(remote_handler(EntryFilter::FILES, display)),
    },
    Command { name: "lls", build: || leaf(HandlerType::Local, lls) },
    Command {
        name: "lcd",
        build: || branch(local_handler(EntryFilter::DIRECTORIES, lcd)),
    },
    Command { name: "lpwd", build: || leaf(HandlerType::Local, lpwd) },
    Command {
        name: "lstat",
        build: || branch(local_handler(EntryFilter::ANY, lstat)),
    },
    Command {
        name: "ldisplay",
        build: || branch(local_handler(EntryFilter::FILES, ldisplay)),
    },
    Command {
        name: "put",
        build: || {
            branch(EntryNamespace::new(HandlerType::Modify, EntryFilter::FILES, &LOCAL, put))
        },
    },
    Command {
        name: "get",
        build: || {
            branch(EntryNamespace::new(HandlerType::Modify, EntryFilter::FILES, &REMOTE, get))
        },
    },
];

fn builtin(action: fn(&mut Shell)) -> Handler {
    leaf(HandlerType::Builtin, action)
}

fn leaf(handler_type: HandlerType, action: fn(&mut Shell)) -> Handler {
    Handler::Leaf(Leaf::new(handler_type, action))
}

fn branch(namespace: EntryNamespace) -> Handler {
    Handler::Branch(Box::new(namespace))
}

/// The top of the dispatch tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct RootNamespace;

impl Namespace for RootNamespace {
    fn handler_type(&self) -> HandlerType {
        HandlerType::Builtin
    }

    fn complete<'a>(&'a self, _shell: &'a mut Shell, part: &'a str) -> Completions<'a> {
        Box::new(
            COMMANDS
                .iter()
                .filter(move |c| c.name.starts_with(part))
                .map(|c| (c.name.to_string(), (c.build)())),
        )
    }

    fn resolve(&self, _shell: &Shell, name: &str) -> Option<Handler> {
        COMMANDS
            .iter()
            .find(|c| c.name == name)
            .map(|c| (c.build)())
    }
}

// Builtins

fn clear(shell: &mut Shell) {
    let result = write!(shell.out, "\x1b[2J\x1b[0;0H").and_then(|()| shell.out.flush());
    shell.report(result.map_err(ShellError::from));
}

fn exit(shell: &mut Shell) {
    shell.exit();
}

fn connect(shell: &mut Shell) {
    if let Err(e) = shell.host.interactive_shell() {
        log::debug!("connect: {e}");
    }
}

// Remote side

fn ls(shell: &mut Shell) {
    let result = shell.host.list().and_then(|names| print_columns(shell, &names));
    shell.report(result);
}

fn cd(shell: &mut Shell, path: &str) {
    let result = shell.host.chdir(path);
    shell.report(result);
}

fn pwd(shell: &mut Shell) {
    let result = shell
        .host
        .cwd()
        .ok_or_else(|| ShellError::RemoteError("remote working directory is unknown".into()))
        .and_then(|cwd| shell.say(&cwd));
    shell.report(result);
}

fn stat(shell: &mut Shell, path: &str) {
    let result = shell.host.stat(path).and_then(|meta| print_stat(shell, &meta));
    shell.report(result);
}

fn display(shell: &mut Shell, path: &str) {
    let result = shell.host.open(path).and_then(|lines| shell.page(lines));
    shell.report(result);
}

// Local side

fn lls(shell: &mut Shell) {
    let result = shell.local.list().and_then(|names| print_columns(shell, &names));
    shell.report(result);
}

fn lcd(shell: &mut Shell, path: &str) {
    let result = shell.local.chdir(path).and_then(|()| {
        let cwd = shell.local.cwd().unwrap_or_default();
        shell.say(&cwd)
    });
    shell.report(result);
}

fn lpwd(shell: &mut Shell) {
    let result = shell
        .local
        .cwd()
        .ok_or_else(|| ShellError::Internal("local working directory is unknown".into()))
        .and_then(|cwd| shell.say(&cwd));
    shell.report(result);
}

fn lstat(shell: &mut Shell, path: &str) {
    let result = shell.local.stat(path).and_then(|meta| print_stat(shell, &meta));
    shell.report(result);
}

fn ldisplay(shell: &mut Shell, path: &str) {
    let result = shell.local.open(path).and_then(|lines| shell.page(lines));
    shell.report(result);
}

// Transfers

fn put(shell: &mut Shell, path: &str) {
    let result = shell.say(&format!("put {path}: uploading is not supported"));
    shell.report(result);
}

fn get(shell: &mut Shell, path: &str) {
    let result = download(shell, path);
    shell.report(result);
}

fn download(shell: &mut Shell, path: &str) -> ShellResult<()> {
    let name = basename(path);
    if name.is_empty() {
        return Err(ShellError::RemoteError(format!("{path}: not a file")));
    }
    shell.say(&format!("Downloading {name}..."))?;

    let local_dir = shell
        .local
        .cwd()
        .ok_or_else(|| ShellError::Internal("local working directory is unknown".into()))?;
    let target = PathBuf::from(local_dir).join(name);
    let bytes = shell.host.download(path, &target)?;
    log::info!("downloaded {path} to {} ({bytes} bytes)", target.display());
    Ok(())
}

fn print_columns(shell: &mut Shell, names: &[String]) -> ShellResult<()> {
    let lines = in_columns(names, shell.console.width());
    shell.page(lines.into_iter().map(Ok))
}

fn print_stat(shell: &mut Shell, meta: &Metadata) -> ShellResult<()> {
    for line in stat_lines(meta) {
        shell.say(&line)?;
    }
    Ok(())
}

fn stat_lines(meta: &Metadata) -> Vec<String> {
    let mut lines = vec![
        format!(" Is file:      {}", meta.is_file()),
        format!(" Is directory: {}", meta.is_dir()),
        String::new(),
        format!(" Size:         {} bytes", meta.size),
    ];
    if let Some(modified) = meta.modified {
        let modified: DateTime<Utc> = modified.into();
        lines.push(format!(
            " Modified:     {}",
            modified.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    lines.extend([
        String::new(),
        format!(" st_uid:       {}", meta.uid),
        format!(" st_gid:       {}", meta.gid),
        format!(" st_mode:      {:o}", meta.mode),
    ]);
    lines
}
