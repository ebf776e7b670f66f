//! SSH backend implementation.
//!
//! Uses the [`openssh`] crate (which shells out to the system's OpenSSH
//! binary) for session management and [`openssh_sftp_client`] for the SFTP
//! subsystem when available.
//!
//! Whole-file reads go through SFTP first and fall back to `cat` over exec
//! if the SFTP channel is missing or misbehaves.  Ranged reads use GNU `dd`
//! over exec.  Listing and stat always use GNU
//! `stat -L` over exec, which follows symlinks and yields every field the
//! shell displays in a single round-trip per directory.
//!
//! Authentication, host keys, `ProxyJump` and `ControlMaster` are delegated
//! to the user's `~/.ssh/config`.

use async_trait::async_trait;
use bytes::Bytes;
use openssh::{KnownHosts, Session, SessionBuilder};
use openssh_sftp_client::{Sftp, SftpOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use super::{Backend, DirEntry, EntryKind, ExecResult, Metadata};
use crate::errors::{ShellError, ShellResult};

/// Fields emitted per path by `stat --printf`, after the optional `%n`.
const STAT_FIELDS: &str = r"%F\t%s\t%Y\t%u\t%g\t%f\n";

// ---------------------------------------------------------------------------
// SSH backend
// ---------------------------------------------------------------------------

/// An SSH backend backed by a live [`openssh::Session`] and an optional
/// [`Sftp`] channel for file reads.
pub struct SshBackend {
    session: Arc<Session>,
    /// `None` if the remote doesn't offer the SFTP subsystem.
    sftp: Option<Sftp>,
    host: String,
}

impl SshBackend {
    /// Open a new SSH connection to `host`, optionally as `user` and/or on a
    /// non-default `port`.
    ///
    /// Failing to open the SFTP channel is not an error; the backend then
    /// runs in exec-only mode.
    pub async fn connect(host: &str, user: Option<&str>, port: Option<u16>) -> ShellResult<Self> {
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);

        if let Some(user) = user {
            builder.user(user.to_string());
        }
        if let Some(port) = port {
            builder.port(port);
        }

        let session = builder
            .connect(host)
            .await
            .map_err(|e| ShellError::ConnectionFailed {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let session = Arc::new(session);

        let sftp = match Sftp::from_clonable_session(session.clone(), SftpOptions::default()).await
        {
            Ok(sftp) => Some(sftp),
            Err(e) => {
                log::info!("{host}: sftp subsystem unavailable, using exec only: {e}");
                None
            }
        };

        Ok(Self {
            session,
            sftp,
            host: host.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Exec helpers
    // -----------------------------------------------------------------------

    /// Run a command via the SSH session and return its collected output.
    async fn run(&self, program: &str, args: &[&str]) -> ShellResult<ExecResult> {
        let mut cmd = self.session.command(program);
        for arg in args {
            cmd.arg(arg);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| ShellError::from_ssh(&self.host, e))?;

        Ok(ExecResult {
            stdout: Bytes::from(output.stdout),
            stderr: Bytes::from(output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run a shell snippet (`sh -c '<script>'`) and return its output.
    async fn run_sh(&self, script: &str) -> ShellResult<ExecResult> {
        self.run("sh", &["-c", script]).await
    }

    /// Turn a failed command result into an appropriate `ShellError`.
    fn check_result(result: &ExecResult, path: &str, host: &str) -> ShellResult<()> {
        if result.exit_code == 0 {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&result.stderr);
        let msg = stderr.trim();

        if msg.contains("No such file")
            || msg.contains("cannot access")
            || msg.contains("cannot stat")
            || msg.contains("not found")
        {
            Err(ShellError::NotFound(path.to_string()))
        } else if msg.contains("Permission denied") || msg.contains("permission denied") {
            Err(ShellError::PermissionDenied(path.to_string()))
        } else if msg.contains("Not a directory") {
            Err(ShellError::NotADirectory(path.to_string()))
        } else if msg.is_empty() {
            Err(ShellError::RemoteError(format!(
                "command failed with exit code {} for path: {path}",
                result.exit_code
            )))
        } else {
            Err(ShellError::from_ssh(host, msg))
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn classify_sftp_error(err: openssh_sftp_client::Error, path: &str) -> ShellError {
        let msg = err.to_string();
        if msg.contains("No such file")
            || msg.contains("not found")
            || msg.contains("does not exist")
            || msg.contains("SSH_FX_NO_SUCH_FILE")
        {
            ShellError::NotFound(path.to_string())
        } else if msg.contains("Permission denied")
            || msg.contains("permission denied")
            || msg.contains("SSH_FX_PERMISSION_DENIED")
        {
            ShellError::PermissionDenied(path.to_string())
        } else {
            ShellError::SftpError(msg)
        }
    }

    async fn read_sftp(&self, sftp: &Sftp, path: &str) -> ShellResult<Bytes> {
        let mut fs = sftp.fs();
        let data = fs
            .read(path)
            .await
            .map_err(|e| Self::classify_sftp_error(e, path))?;
        Ok(data.freeze())
    }

    async fn read_exec(&self, path: &str) -> ShellResult<Bytes> {
        let result = self.run_sh(&format!("cat {}", shell_escape(path))).await?;
        Self::check_result(&result, path, &self.host)?;
        Ok(result.stdout)
    }
}

// ---------------------------------------------------------------------------
// Backend trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for SshBackend {
    async fn read(&self, path: &str) -> ShellResult<Bytes> {
        if let Some(ref sftp) = self.sftp {
            match self.read_sftp(sftp, path).await {
                Ok(data) => return Ok(data),
                Err(ShellError::SftpError(e)) => {
                    log::debug!("{}: sftp read of {path} failed, retrying via exec: {e}", self.host);
                }
                Err(e) => return Err(e),
            }
        }
        self.read_exec(path).await
    }

    async fn read_range(&self, path: &str, offset: u64, len: usize) -> ShellResult<Bytes> {
        let result = self.run_sh(&range_script(path, offset, len)).await?;
        Self::check_result(&result, path, &self.host)?;
        Ok(result.stdout)
    }

    async fn list(&self, path: &str) -> ShellResult<Vec<DirEntry>> {
        let dir = path.trim_end_matches('/');
        let escaped = shell_escape(if dir.is_empty() { "/" } else { dir });

        // Fail loudly for a missing or non-directory target before globbing,
        // which would otherwise just produce an empty listing.
        let probe = self
            .run_sh(&format!("test -d {escaped} || ls -d {escaped}"))
            .await?;
        Self::check_result(&probe, path, &self.host)?;
        if probe.exit_code == 0 && !probe.stdout.is_empty() {
            return Err(ShellError::NotADirectory(path.to_string()));
        }

        let script = format!(
            r#"cd {escaped} || exit 1
for f in * .*; do
  case "$f" in .|..) continue;; esac
  [ -e "$f" ] || [ -L "$f" ] || continue
  stat -L --printf='%n\t{STAT_FIELDS}' "$f" 2>/dev/null \
    || stat --printf='%n\t{STAT_FIELDS}' "$f" 2>/dev/null
done"#
        );

        let result = self.run_sh(&script).await?;
        if result.exit_code != 0 && result.stdout.is_empty() {
            Self::check_result(&result, path, &self.host)?;
        }

        let stdout = String::from_utf8_lossy(&result.stdout);
        let entries = stdout
            .lines()
            .filter_map(|line| {
                let (name, rest) = line.split_once('\t')?;
                let metadata = parse_stat_fields(rest)?;
                let name = Path::new(name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.to_string());
                Some(DirEntry { name, metadata })
            })
            .collect();

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> ShellResult<Metadata> {
        let script = format!("stat -L --printf='{STAT_FIELDS}' {}", shell_escape(path));
        let result = self.run_sh(&script).await?;
        Self::check_result(&result, path, &self.host)?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        let line = stdout.trim_end_matches('\n');
        parse_stat_fields(line)
            .ok_or_else(|| ShellError::RemoteError(format!("unexpected stat output: {line}")))
    }

    async fn exec(&self, cmd: &str, args: &[&str]) -> ShellResult<ExecResult> {
        self.run(cmd, args).await
    }

    fn description(&self) -> String {
        if self.sftp.is_some() {
            format!("ssh+sftp:{}", self.host)
        } else {
            format!("ssh:{}", self.host)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse one line of [`STAT_FIELDS`] output (without the name column).
fn parse_stat_fields(line: &str) -> Option<Metadata> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 6 {
        return None;
    }

    Some(Metadata {
        kind: parse_file_type(parts[0]),
        size: parts[1].parse().unwrap_or(0),
        modified: parts[2]
            .parse::<u64>()
            .ok()
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
        uid: parts[3].parse().unwrap_or(0),
        gid: parts[4].parse().unwrap_or(0),
        mode: u32::from_str_radix(parts[5].trim(), 16).unwrap_or(0),
    })
}

/// Parse GNU stat's `%F` output into an [`EntryKind`].
fn parse_file_type(type_str: &str) -> EntryKind {
    let s = type_str.to_ascii_lowercase();
    if s.contains("directory") {
        EntryKind::Dir
    } else if s.contains("symbolic link") || s.contains("symlink") {
        EntryKind::Symlink
    } else {
        EntryKind::File
    }
}

/// A GNU `dd` invocation copying `len` bytes from `offset` to stdout.
fn range_script(path: &str, offset: u64, len: usize) -> String {
    format!(
        "dd if={} iflag=skip_bytes,count_bytes,fullblock skip={offset} count={len} bs={len} \
         status=none",
        shell_escape(path)
    )
}

/// Shell-escape a string for safe embedding in `sh -c '…'` commands.
pub(crate) fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_regular_file_line() {
        let meta = parse_stat_fields("regular file\t12\t1700000000\t1000\t100\t81a4").unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 12);
        assert_eq!(meta.uid, 1000);
        assert_eq!(meta.gid, 100);
        assert_eq!(meta.mode, 0o100644);
        assert_eq!(
            meta.modified,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn parses_directory_line() {
        let meta = parse_stat_fields("directory\t4096\t0\t0\t0\t41ed").unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.mode, 0o40755);
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(parse_stat_fields("directory\t4096").is_none());
    }

    #[test]
    fn file_type_strings() {
        assert_eq!(parse_file_type("regular empty file"), EntryKind::File);
        assert_eq!(parse_file_type("symbolic link"), EntryKind::Symlink);
        assert_eq!(parse_file_type("Directory"), EntryKind::Dir);
    }

    #[test]
    fn range_script_counts_bytes() {
        assert_eq!(
            range_script("/home/a b", 65536, 4096),
            "dd if='/home/a b' iflag=skip_bytes,count_bytes,fullblock skip=65536 count=4096 \
             bs=4096 status=none"
        );
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
        assert_eq!(shell_escape("/home/a b"), "'/home/a b'");
    }
}
