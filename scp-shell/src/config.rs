//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::errors::{ShellError, ShellResult};

/// Browse and copy files on a remote host over SSH.
///
/// Opens an interactive shell with tab completion for both the remote and
/// the local working directory.  Commands prefixed with `l` (`lls`, `lcd`,
/// `lpwd`, `lstat`, `ldisplay`) act on the local side.
#[derive(Debug, Parser)]
#[command(name = "scp-shell", version, about, long_about = None)]
pub struct Cli {
    /// Remote host, as `[user@]host`. Anything in `~/.ssh/config` works.
    pub destination: String,

    /// SSH port on the remote host.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Remote user name (overrides a user given in the destination).
    #[arg(short = 'l', long)]
    pub user: Option<String>,

    /// Initial remote working directory.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<String>,

    /// How long remote file metadata is cached, e.g. `5`, `2.5`, `500ms`, `10s`.
    #[arg(long, env = "SCP_SHELL_STAT_TTL", default_value = "5s", value_parser = parse_ttl_arg)]
    pub stat_ttl: Duration,

    /// Line editor history file.
    #[arg(long, env = "SCP_SHELL_HISTORY", value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Disable colored output (also implied by `NO_COLOR`).
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// The remote to connect to, with `--user`/`--port` applied.
    pub fn destination(&self) -> ShellResult<Destination> {
        let mut dest = Destination::parse(&self.destination)?;
        if self.user.is_some() {
            dest.user = self.user.clone();
        }
        if self.port.is_some() {
            dest.port = self.port;
        }
        Ok(dest)
    }

    /// The history file to use, if one can be determined.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("scp-shell").join("history")))
    }

    pub fn color(&self) -> bool {
        !self.no_color && std::env::var_os("NO_COLOR").is_none()
    }
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Destination {
    /// Parse `[user@]host`.
    pub fn parse(s: &str) -> ShellResult<Self> {
        let (user, host) = match s.rsplit_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, s),
        };
        if host.is_empty() {
            return Err(ShellError::Internal(format!(
                "invalid destination '{s}': missing host"
            )));
        }

        Ok(Self {
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            host: host.to_string(),
            port: None,
        })
    }
}

fn parse_ttl_arg(s: &str) -> Result<Duration, String> {
    parse_ttl_string(s).ok_or_else(|| format!("invalid duration '{s}'"))
}

/// Parse a human-friendly TTL string like `"5"`, `"2.5"`, `"500ms"`, `"10s"`, `"0"`.
fn parse_ttl_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(ms) = s.strip_suffix("ms") {
        return ms
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0)
            .map(|v| Duration::from_secs_f64(v / 1000.0));
    }
    let s = s
        .strip_suffix("sec")
        .or_else(|| s.strip_suffix('s'))
        .unwrap_or(s);
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
}
