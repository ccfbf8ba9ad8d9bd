use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::events::BackendKind;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Playlist loaded by `--start` when no path is given on the command line.
    pub playlist_path: PathBuf,
    /// Exclusive lock file claiming single-instance ownership.
    pub lock_path: PathBuf,
    /// Shared file a second invocation writes its play request to.
    pub command_path: PathBuf,
    /// How often the running instance looks for a command file.
    #[serde(with = "humantime_serde")]
    pub command_poll_interval: Duration,
    /// Delay before checking that a freshly opened backend reached playing.
    #[serde(with = "humantime_serde")]
    pub liveness_timeout: Duration,
    /// Retry delay after skipping a missing or unreadable file.
    #[serde(with = "humantime_serde")]
    pub missing_file_retry: Duration,
    /// Delay before moving on once every backend failed an entry.
    #[serde(with = "humantime_serde")]
    pub failed_entry_retry: Duration,
    /// Initial playback speed multiplier.
    pub playback_speed: f32,
    /// Optional deterministic seed for playlist shuffling.
    pub shuffle_seed: Option<u64>,
    /// Image shown while stopped.
    pub background_image: Option<PathBuf>,
    /// External player programs backing each backend kind.
    pub backends: BackendsConfig,
    /// Per-extension backend order overriding the built-in table.
    pub backend_preferences: BTreeMap<String, Vec<BackendKind>>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.command_poll_interval.is_zero(),
            "command-poll-interval must be greater than zero"
        );
        ensure!(
            !self.liveness_timeout.is_zero(),
            "liveness-timeout must be greater than zero"
        );
        ensure!(
            (MIN_SPEED..=MAX_SPEED).contains(&self.playback_speed),
            "playback-speed must be within {MIN_SPEED}..={MAX_SPEED}"
        );
        ensure!(
            self.lock_path != self.command_path,
            "lock-path and command-path must differ"
        );
        for (ext, kinds) in &self.backend_preferences {
            ensure!(
                !kinds.is_empty(),
                "backend-preferences.{ext} must name at least one backend"
            );
        }
        self.backend_preferences = std::mem::take(&mut self.backend_preferences)
            .into_iter()
            .map(|(ext, kinds)| (ext.trim_start_matches('.').to_ascii_lowercase(), kinds))
            .collect();
        self.backends.validate()?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            playlist_path: PathBuf::from("playlist.csv"),
            lock_path: tmp.join("kiosk-player.lock"),
            command_path: tmp.join("kiosk-player.cmd"),
            command_poll_interval: Duration::from_secs(1),
            liveness_timeout: Duration::from_secs(2),
            missing_file_retry: Duration::from_secs(2),
            failed_entry_retry: Duration::from_secs(1),
            playback_speed: 1.0,
            shuffle_seed: None,
            background_image: None,
            backends: BackendsConfig::default(),
            backend_preferences: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BackendsConfig {
    pub primary: PlayerProgram,
    pub toolkit: PlayerProgram,
    pub pipeline: PipelineProgram,
}

impl BackendsConfig {
    fn validate(&self) -> Result<()> {
        for kind in BackendKind::ALL {
            ensure!(
                !self.program_for(kind).trim().is_empty(),
                "backends.{kind}.program must not be empty"
            );
        }
        ensure!(
            !self.pipeline.pipelines.is_empty(),
            "backends.pipeline.pipelines must list at least one pipeline"
        );
        Ok(())
    }

    pub fn program_for(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::PrimaryDecoder => &self.primary.program,
            BackendKind::ToolkitDecoder => &self.toolkit.program,
            BackendKind::PipelineDecoder => &self.pipeline.program,
        }
    }

    pub fn enabled(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::PrimaryDecoder => self.primary.enabled,
            BackendKind::ToolkitDecoder => self.toolkit.enabled,
            BackendKind::PipelineDecoder => self.pipeline.enabled,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: PlayerProgram::new(
                "ffplay",
                &["-autoexit", "-fs", "-loglevel", "error", "{path}"],
            ),
            toolkit: PlayerProgram::new(
                "mpv",
                &["--fs", "--really-quiet", "--no-terminal", "{path}"],
            ),
            pipeline: PipelineProgram::default(),
        }
    }
}

/// An external player invocation. `{path}` and `{uri}` in `args` are
/// substituted with the media file; without either, the path is appended.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlayerProgram {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PlayerProgram {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineProgram {
    pub program: String,
    /// Arguments placed before the pipeline description.
    pub args: Vec<String>,
    /// Pipeline descriptions tried in order until one launches.
    pub pipelines: Vec<String>,
    pub enabled: bool,
}

impl Default for PipelineProgram {
    fn default() -> Self {
        Self {
            program: "gst-launch-1.0".to_string(),
            args: vec!["-q".to_string()],
            pipelines: vec![
                "playbin uri={uri} video-sink=autovideosink".to_string(),
                "playbin uri={uri} video-sink=xvimagesink".to_string(),
                "filesrc location={path} ! decodebin ! videoconvert ! autovideosink".to_string(),
                "playbin uri={uri}".to_string(),
            ],
            enabled: true,
        }
    }
}

const fn default_enabled() -> bool {
    true
}
