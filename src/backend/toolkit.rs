use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::process::{ProcessPlayer, expand_args};
use super::{EventSink, MediaBackend};
use crate::config::PlayerProgram;
use crate::error::OpenError;
use crate::events::{BackendKind, BackendState};

/// General purpose media toolkit player. Playback speed is passed on the
/// command line, so changes take effect with the next `open`.
pub struct ToolkitBackend {
    program: PlayerProgram,
    player: ProcessPlayer,
    speed: f32,
}

impl ToolkitBackend {
    pub fn new(program: PlayerProgram, events: EventSink) -> Self {
        Self {
            program,
            player: ProcessPlayer::new(BackendKind::ToolkitDecoder, events),
            speed: 1.0,
        }
    }

    fn launch_args(&self, path: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.program.args.len() + 1);
        if (self.speed - 1.0).abs() > f32::EPSILON {
            args.push(format!("--speed={:.2}", self.speed));
        }
        args.extend(expand_args(
            self.program.args.iter().map(String::as_str),
            path,
        ));
        args
    }
}

impl MediaBackend for ToolkitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ToolkitDecoder
    }

    fn open(&mut self, path: &Path) -> Result<(), OpenError> {
        if !path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        let args = self.launch_args(path);
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
        self.speed = multiplier;
        if self.player.state().is_live() {
            debug!(multiplier, "speed change applies from the next clip");
        }
    }

    fn position(&self) -> Duration {
        self.player.position()
    }

    fn state(&self) -> BackendState {
        self.player.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Ticket;

    fn backend() -> ToolkitBackend {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let program = PlayerProgram {
            program: "mpv".to_string(),
            args: vec!["--fs".to_string(), "{path}".to_string()],
            enabled: true,
        };
        ToolkitBackend::new(program, EventSink::new(Ticket(1), tx))
    }

    #[test]
    fn speed_flag_only_when_not_native() {
        let mut b = backend();
        assert_eq!(b.launch_args(Path::new("a.mov")), ["--fs", "a.mov"]);
        b.set_speed(1.5);
        assert_eq!(
            b.launch_args(Path::new("a.mov")),
            ["--speed=1.50", "--fs", "a.mov"]
        );
    }

    #[test]
    fn missing_file_is_rejected_before_launch() {
        let mut b = backend();
        let err = b.open(Path::new("/nowhere/clip.mov")).unwrap_err();
        assert!(matches!(err, OpenError::NotFound(_)));
        assert_eq!(b.state(), BackendState::Stopped);
    }
}
