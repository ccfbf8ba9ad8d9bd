use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::process::{ProcessPlayer, expand_args};
use super::{EventSink, MediaBackend};
use crate::config::PipelineProgram;
use crate::error::OpenError;
use crate::events::{BackendKind, BackendState};

/// Media pipeline launcher. Each configured pipeline description is tried in
/// order until one keeps running past startup.
pub struct PipelineBackend {
    program: PipelineProgram,
    player: ProcessPlayer,
}

impl PipelineBackend {
    pub fn new(program: PipelineProgram, events: EventSink) -> Self {
        Self {
            program,
            player: ProcessPlayer::new(BackendKind::PipelineDecoder, events),
        }
    }

    fn pipeline_args(&self, description: &str, path: &Path) -> Vec<String> {
        let mut args = self.program.args.clone();
        args.extend(expand_args(description.split_whitespace(), path));
        args
    }
}

impl MediaBackend for PipelineBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PipelineDecoder
    }

    fn open(&mut self, path: &Path) -> Result<(), OpenError> {
        if !path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        if self.program.pipelines.is_empty() {
            return Err(OpenError::Rejected("no pipelines configured".to_string()));
        }
        debug!(pipelines = self.program.pipelines.len(), path = %path.display(), "launching pipeline");
        let attempts = self
            .program
            .pipelines
            .iter()
            .map(|description| self.pipeline_args(description, path))
            .collect();
        self.player.launch_any(&self.program.program, attempts)
    }

    fn play(&mut self) {
        self.player.play();
    }

    fn pause(&mut self) {
        self.player.pause();
    }

    fn stop(&mut self) {
        self.player.stop();
    }

    fn position(&self) -> Duration {
        self.player.position()
    }

    fn state(&self) -> BackendState {
        self.player.state()
    }
}
