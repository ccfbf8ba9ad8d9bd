use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

/// The three families of media backends the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "primary")]
    PrimaryDecoder,
    #[serde(rename = "toolkit")]
    ToolkitDecoder,
    #[serde(rename = "pipeline")]
    PipelineDecoder,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [
        Self::PrimaryDecoder,
        Self::ToolkitDecoder,
        Self::PipelineDecoder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryDecoder => "primary",
            Self::ToolkitDecoder => "toolkit",
            Self::PipelineDecoder => "pipeline",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Opening,
    Playing,
    Paused,
    Stopped,
    Ended,
    Failed,
}

impl BackendState {
    /// Whether the backend still holds a resource that can be resumed.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Opening | Self::Playing | Self::Paused)
    }
}

/// Identifies one open attempt. Events carrying an outdated ticket come from
/// a backend that has already been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    EndOfMedia,
    Error(String),
    StateChanged(BackendState),
}

#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub ticket: Ticket,
    pub event: BackendEvent,
}

/// One-shot request handed over by a second process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub path: PathBuf,
    pub duration_secs: u64,
}

/// Control input for the player loop (keys, signals, command channel).
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Start,
    TogglePause,
    Stop,
    Next,
    Previous,
    SeekRelative(i64),
    ChangeSpeed(f32),
    ToggleRepeat,
    Shuffle,
    Inject(PlayRequest),
    Quit,
}

/// Why the player loop asked the process to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Completed,
    Failed,
}

impl Shutdown {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Failed => 1,
        }
    }
}
