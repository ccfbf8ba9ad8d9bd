use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::process::{ProcessPlayer, expand_args};
use super::{EventSink, MediaBackend};
use crate::config::PlayerProgram;
use crate::error::OpenError;
use crate::events::{BackendKind, BackendState};

/// Frame decoder player; the first choice for common containers.
pub struct FrameDecoderBackend {
    program: PlayerProgram,
    player: ProcessPlayer,
}

impl FrameDecoderBackend {
    pub fn new(program: PlayerProgram, events: EventSink) -> Self {
        Self {
            program,
            player: ProcessPlayer::new(BackendKind::PrimaryDecoder, events),
        }
    }
}

impl MediaBackend for FrameDecoderBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PrimaryDecoder
    }

    fn open(&mut self, path: &Path) -> Result<(), OpenError> {
        if !path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        let args = expand_args(self.program.args.iter().map(String::as_str), path);
        self.player.launch(&self.program.program, &args)
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

    fn set_speed(&mut self, multiplier: f32) {
        // Decoding runs at the file's native rate.
        debug!(multiplier, "frame decoder plays at native speed");
    }

    fn position(&self) -> Duration {
        self.player.position()
    }

    fn state(&self) -> BackendState {
        self.player.state()
    }
}
