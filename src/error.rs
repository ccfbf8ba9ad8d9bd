use std::path::PathBuf;

use thiserror::Error;

/// Failure to read a playlist source that exists on disk.
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("failed to read playlist {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single record could not be understood. Loading skips these.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// A backend could not acquire resources for a media file.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("media file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Rejected(String),
}

/// Problems on the command handoff channel.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
