//! Single-instance detection and the file-based command handoff.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::events::PlayRequest;

const PLAY_VERB: &str = "play";

/// Exclusive advisory lock proving this process is the running instance.
/// Released when dropped.
pub struct InstanceLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl InstanceLock {
    /// Claim the lock without blocking. `None` means another live process
    /// holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                debug!(path = %path.display(), "instance lock held elsewhere");
                return Ok(None);
            }
            Err((_, errno)) => {
                return Err(io::Error::from(errno))
                    .with_context(|| format!("failed to lock {}", path.display()));
            }
        };
        lock.set_len(0)
            .and_then(|()| writeln!(&*lock, "{}", std::process::id()))
            .with_context(|| format!("failed to record pid in {}", path.display()))?;
        info!(path = %path.display(), pid = std::process::id(), "instance lock claimed");
        Ok(Some(Self {
            path: path.to_path_buf(),
            _lock: lock,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for PlayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PLAY_VERB},{},{}",
            self.path.display(),
            self.duration_secs
        )
    }
}

impl FromStr for PlayRequest {
    type Err = CommandError;

    /// Parse `play,<path>,<duration>`. The duration is the last field, so
    /// paths may contain commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.lines().next().unwrap_or_default().trim();
        let malformed = || CommandError::Malformed(line.to_string());
        let (verb, rest) = line.split_once(',').ok_or_else(malformed)?;
        if !verb.trim().eq_ignore_ascii_case(PLAY_VERB) {
            return Err(malformed());
        }
        let (path, duration) = rest.rsplit_once(',').ok_or_else(malformed)?;
        let path = path.trim();
        if path.is_empty() {
            return Err(malformed());
        }
        let duration_secs = duration.trim().parse::<u64>().map_err(|_| malformed())?;
        Ok(Self {
            path: PathBuf::from(path),
            duration_secs,
        })
    }
}

/// (mtime, len) of the command file when it was last looked at.
type Stamp = (Option<SystemTime>, u64);

/// The well-known command file shared by all invocations.
#[derive(Debug)]
pub struct CommandMailbox {
    path: PathBuf,
    last_seen: Option<Stamp>,
}

impl CommandMailbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand a request to the running instance. The record is written to a
    /// sibling file first and renamed into place.
    pub fn send(&self, request: &PlayRequest) -> Result<(), CommandError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "command".to_string());
        let staging = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
        fs::write(&staging, format!("{request}\n"))?;
        if let Err(err) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        info!(path = %self.path.display(), request = %request, "play request handed off");
        Ok(())
    }

    /// Look for a pending request; a consumed record is removed, even when
    /// malformed.
    pub fn poll_once(&mut self) -> Result<Option<PlayRequest>, CommandError> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.last_seen = None;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let stamp = (meta.modified().ok(), meta.len());
        if self.last_seen == Some(stamp) {
            return Ok(None);
        }
        self.last_seen = Some(stamp);

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.last_seen = None;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        match fs::remove_file(&self.path) {
            Ok(()) => self.last_seen = None,
            Err(err) => warn!(path = %self.path.display(), "failed to remove command file: {err}"),
        }
        text.parse::<PlayRequest>().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_with_commas_in_path() {
        let req: PlayRequest = "play,/media/a,b.mp4,20\n".parse().unwrap();
        assert_eq!(req.path, PathBuf::from("/media/a,b.mp4"));
        assert_eq!(req.duration_secs, 20);
        assert_eq!(req.to_string(), "play,/media/a,b.mp4,20");
    }

    #[test]
    fn rejects_malformed_records() {
        for bad in ["", "play", "stop,foo.mp4,3", "play,foo.mp4", "play,,3", "play,foo.mp4,-1", "play,foo.mp4,x"] {
            assert!(
                matches!(bad.parse::<PlayRequest>(), Err(CommandError::Malformed(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn second_lock_is_refused_until_first_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.lock");
        let first = InstanceLock::acquire(&path).unwrap().expect("first claim");
        assert!(InstanceLock::acquire(&path).unwrap().is_none());
        let pid = fs::read_to_string(first.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
        drop(first);
        assert!(InstanceLock::acquire(&path).unwrap().is_some());
    }

    #[test]
    fn mailbox_consumes_each_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.cmd");
        let sender = CommandMailbox::new(&path);
        let mut receiver = CommandMailbox::new(&path);

        assert!(receiver.poll_once().unwrap().is_none());
        let req = PlayRequest {
            path: PathBuf::from("clip.mp4"),
            duration_secs: 20,
        };
        sender.send(&req).unwrap();
        assert_eq!(receiver.poll_once().unwrap(), Some(req));
        assert!(!path.exists());
        assert!(receiver.poll_once().unwrap().is_none());
    }

    #[test]
    fn malformed_record_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.cmd");
        fs::write(&path, "garbage\n").unwrap();
        let mut receiver = CommandMailbox::new(&path);
        assert!(matches!(
            receiver.poll_once(),
            Err(CommandError::Malformed(_))
        ));
        assert!(!path.exists());
    }
}
