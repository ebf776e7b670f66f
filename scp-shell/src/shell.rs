//! The interactive session: connection, caches, output and the dispatch
//! entry points the terminal front end calls.

use std::io::{self, Write};

use owo_colors::{AnsiColors, OwoColorize};

use crate::cache::DirCache;
use crate::commands::RootNamespace;
use crate::console::Console;
use crate::errors::{ShellError, ShellResult};
use crate::handler::{Handler, Leaf, Namespace};
use crate::host::{Filesystem, Host, basename};

pub struct Shell {
    pub(crate) host: Box<dyn Host>,
    pub(crate) local: Box<dyn Filesystem>,
    pub(crate) cd_cache: DirCache,
    pub(crate) out: Box<dyn Write>,
    pub(crate) console: Console,
    color: bool,
    exiting: bool,
    root: RootNamespace,
}

impl Shell {
    pub fn new(host: Box<dyn Host>, local: Box<dyn Filesystem>) -> Self {
        Self {
            host,
            local,
            cd_cache: DirCache::new(),
            out: Box::new(io::stdout()),
            console: Console::default(),
            color: false,
            exiting: false,
            root: RootNamespace,
        }
    }

    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn local(&self) -> &dyn Filesystem {
        self.local.as_ref()
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Completion candidates for the last of `tokens`, the ones before it
    /// having been typed in full.  Never fails; anything that cannot be
    /// walked yields no candidates.
    pub fn complete(&mut self, tokens: &[&str]) -> Vec<(String, Handler)> {
        let (part, path) = match tokens.split_last() {
            Some((part, path)) => (*part, path),
            None => ("", tokens),
        };

        let mut node = Handler::Branch(Box::new(self.root));
        for name in path {
            node = match node {
                Handler::Branch(ns) => match ns.resolve(self, name) {
                    Some(child) => child,
                    None => return Vec::new(),
                },
                Handler::Leaf(_) => return Vec::new(),
            };
        }

        let Handler::Branch(ns) = node else {
            return Vec::new();
        };
        ns.complete(self, part).collect()
    }

    /// Walk `tokens` from the root to the leaf they name.
    pub fn resolve(&self, tokens: &[&str]) -> ShellResult<Leaf> {
        let Some((first, rest)) = tokens.split_first() else {
            return Err(ShellError::NoSuchCommand(String::new()));
        };

        let mut node = self
            .root
            .resolve(self, first)
            .ok_or_else(|| ShellError::NoSuchCommand(first.to_string()))?;
        let mut command = first.to_string();

        for token in rest {
            node = match node {
                Handler::Leaf(_) => {
                    return Err(ShellError::UnexpectedArgument {
                        command,
                        argument: token.to_string(),
                    });
                }
                Handler::Branch(ns) => {
                    ns.resolve(self, token)
                        .ok_or_else(|| ShellError::NoSuchEntry {
                            command: command.clone(),
                            name: token.to_string(),
                        })?
                }
            };
            command.push(' ');
            command.push_str(token);
        }

        match node {
            Handler::Leaf(leaf) => Ok(leaf),
            Handler::Branch(_) => Err(ShellError::Incomplete(command)),
        }
    }

    /// Resolve `tokens` and run the leaf.  Dispatch failures are reported
    /// like any other error; an empty line does nothing.
    pub fn resolve_and_invoke(&mut self, tokens: &[&str]) {
        if tokens.is_empty() {
            return;
        }
        match self.resolve(tokens) {
            Ok(leaf) => {
                log::debug!("invoking {tokens:?} as {leaf:?}");
                leaf.invoke(self);
            }
            Err(e) => self.report(Err(e)),
        }
    }

    /// Split `line` into shell words and run it.  Quotes and backslashes
    /// follow POSIX shell rules, so names containing spaces can be typed.
    pub fn execute(&mut self, line: &str) {
        let Some(words) = shlex::split(line) else {
            self.report(Err(ShellError::UnbalancedQuotes(line.trim().to_string())));
            return;
        };
        let tokens: Vec<&str> = words.iter().map(String::as_str).collect();
        self.resolve_and_invoke(&tokens);
    }

    /// The remote working directory listing, served from the session cache.
    pub fn remote_listing(&mut self) -> Vec<String> {
        let cwd = self.host.cwd();
        let host = &self.host;
        self.cd_cache.get_or_fetch(cwd.as_deref(), || host.list())
    }

    /// The local working directory listing, never cached.
    pub fn local_listing(&mut self) -> Vec<String> {
        self.local.list().unwrap_or_else(|e| {
            log::debug!("listing local directory for completion failed: {e}");
            Vec::new()
        })
    }

    /// Labeled prompt segments with their colors.
    pub fn prompt(&self) -> Vec<(String, AnsiColors)> {
        let local = self.local.cwd().unwrap_or_default();
        let remote = self.host.cwd().unwrap_or_default();
        vec![
            (format!("local:{}", basename(&local)), AnsiColors::Yellow),
            (" ~ ".to_string(), AnsiColors::Cyan),
            (format!("{}:", self.host.slug()), AnsiColors::Yellow),
            (basename(&remote).to_string(), AnsiColors::Yellow),
            (" > ".to_string(), AnsiColors::Cyan),
        ]
    }

    /// The prompt as one string; colored unless color is disabled.
    pub fn render_prompt(&self, color: bool) -> String {
        self.prompt()
            .into_iter()
            .map(|(text, c)| {
                if color {
                    text.color(c).to_string()
                } else {
                    text
                }
            })
            .collect()
    }

    pub fn exit(&mut self) {
        self.exiting = true;
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Write one line of output.
    pub(crate) fn say(&mut self, line: &str) -> ShellResult<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    /// Page `lines` to the output.
    pub(crate) fn page<I>(&mut self, lines: I) -> ShellResult<()>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        self.console.lesspipe(&mut self.out, lines)?;
        Ok(())
    }

    /// Print a failed result as `ERROR: <message>`.
    pub(crate) fn report(&mut self, result: ShellResult<()>) {
        let Err(e) = result else {
            return;
        };
        log::debug!("command failed: {e:?}");
        let label = if self.color {
            "ERROR:".red().bold().to_string()
        } else {
            "ERROR:".to_string()
        };
        if let Err(write_err) = writeln!(self.out, "{label} {e}") {
            log::warn!("could not write error message: {write_err}");
        }
    }
}
