use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("ssh: could not connect to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("ssh: authentication failed for {host}")]
    AuthFailed { host: String },

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("remote: {0}")]
    RemoteError(String),

    #[error("sftp: {0}")]
    SftpError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no such command: {0}")]
    NoSuchCommand(String),

    #[error("{command}: no such entry: {name}")]
    NoSuchEntry { command: String, name: String },

    #[error("{0}: incomplete command")]
    Incomplete(String),

    #[error("{command}: unexpected argument '{argument}'")]
    UnexpectedArgument { command: String, argument: String },

    #[error("unterminated quote or escape: {0}")]
    UnbalancedQuotes(String),

    #[error("scp-shell: {0}")]
    Internal(String),
}

impl ShellError {
    /// Classify an SSH/SFTP error into a more specific `ShellError` when possible.
    pub fn from_ssh(host: &str, err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("No such file") || msg.contains("not found") {
            ShellError::NotFound(msg)
        } else if msg.contains("Permission denied") || msg.contains("permission denied") {
            ShellError::PermissionDenied(msg)
        } else if msg.contains("Authentication failed") {
            ShellError::AuthFailed {
                host: host.to_string(),
            }
        } else if msg.contains("Connection refused")
            || msg.contains("Connection timed out")
            || msg.contains("Could not resolve")
        {
            ShellError::ConnectionFailed {
                host: host.to_string(),
                reason: msg,
            }
        } else {
            ShellError::RemoteError(msg)
        }
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
