use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{Configuration, MAX_SPEED, MIN_SPEED};
use crate::events::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    PausedAtFrame,
    Stopped,
}

/// Observable engine state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Entry most recently dispatched, or about to be.
    pub current_index: usize,
    pub phase: Phase,
    /// Terminate after the one entry instead of advancing.
    pub single_file: bool,
    pub active_backend: Option<BackendKind>,
    pub speed: f32,
    /// Automatic advancement replays the current entry.
    pub repeat_current: bool,
}

impl EngineState {
    pub(crate) fn new(single_file: bool, speed: f32) -> Self {
        Self {
            current_index: 0,
            phase: Phase::Idle,
            single_file,
            active_backend: None,
            speed: clamp_speed(speed),
            repeat_current: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    pub fn is_paused_at_frame(&self) -> bool {
        self.phase == Phase::PausedAtFrame
    }
}

pub(crate) fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Timing and policy knobs the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub liveness_timeout: Duration,
    pub missing_file_retry: Duration,
    pub failed_entry_retry: Duration,
    pub speed: f32,
    pub shuffle_seed: Option<u64>,
    pub backend_preferences: BTreeMap<String, Vec<BackendKind>>,
    pub single_file: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

impl From<&Configuration> for EngineOptions {
    fn from(cfg: &Configuration) -> Self {
        Self {
            liveness_timeout: cfg.liveness_timeout,
            missing_file_retry: cfg.missing_file_retry,
            failed_entry_retry: cfg.failed_entry_retry,
            speed: cfg.playback_speed,
            shuffle_seed: cfg.shuffle_seed,
            backend_preferences: cfg.backend_preferences.clone(),
            single_file: false,
        }
    }
}
