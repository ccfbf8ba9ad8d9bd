//! Media backends: the capability interface, the per-extension preference
//! table and the factory that builds concrete adapters.

mod pipeline;
mod primary;
mod process;
mod toolkit;

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::config::BackendsConfig;
use crate::error::OpenError;
use crate::events::{BackendEvent, BackendKind, BackendState, TaggedEvent, Ticket};

pub use pipeline::PipelineBackend;
pub use primary::FrameDecoderBackend;
pub use process::program_on_path;
pub use toolkit::ToolkitBackend;

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension; anything that is not a known video is an image.
    pub fn of(path: &Path) -> Self {
        match extension(path) {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Self::Video,
            _ => Self::Image,
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|s| s.to_ascii_lowercase())
}

/// A decode/render capability provider.
///
/// Implementations never fail on teardown: `stop` and `close` log internal
/// problems and always leave the adapter without a held resource.
pub trait MediaBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Acquire resources for `path`. Safe to call again after `close`.
    fn open(&mut self, path: &Path) -> Result<(), OpenError>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Stop playback and release every held resource.
    fn stop(&mut self);

    fn seek_relative(&mut self, delta_secs: i64) {
        debug!(backend = %self.kind(), delta_secs, "seek not supported; ignored");
    }

    fn set_speed(&mut self, multiplier: f32) {
        debug!(backend = %self.kind(), multiplier, "speed control not supported; ignored");
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn duration(&self) -> Duration {
        Duration::ZERO
    }

    /// `Playing` only once media is actually running. Process adapters
    /// report it after the player has outlived its startup grace period, so
    /// the engine's liveness check sees through players that die on launch.
    fn state(&self) -> BackendState;

    fn close(&mut self) {
        self.stop();
    }
}

/// Builds backends on demand; the engine asks for one per open attempt.
pub trait BackendFactory: Send {
    fn is_available(&self, kind: BackendKind) -> bool;

    fn create(&self, kind: BackendKind, events: EventSink) -> Box<dyn MediaBackend>;
}

/// Push channel from a backend to the engine, stamped with the ticket of the
/// open attempt that produced it.
#[derive(Debug, Clone)]
pub struct EventSink {
    ticket: Ticket,
    tx: UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(ticket: Ticket, tx: UnboundedSender<TaggedEvent>) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn emit(&self, event: BackendEvent) {
        let tagged = TaggedEvent {
            ticket: self.ticket,
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!(ticket = self.ticket.0, "player loop gone; backend event dropped");
        }
    }
}

/// Ranked backend order per file extension.
#[derive(Debug, Clone, Default)]
pub struct BackendPreferences {
    overrides: BTreeMap<String, Vec<BackendKind>>,
}

impl BackendPreferences {
    pub fn with_overrides(overrides: BTreeMap<String, Vec<BackendKind>>) -> Self {
        Self { overrides }
    }

    pub fn order_for(&self, path: &Path) -> Vec<BackendKind> {
        let ext = extension(path).unwrap_or_default();
        if let Some(kinds) = self.overrides.get(&ext) {
            return kinds.clone();
        }
        default_order(&ext).to_vec()
    }
}

fn default_order(ext: &str) -> &'static [BackendKind] {
    use crate::events::BackendKind::*;
    match ext {
        "mp4" | "avi" => &[PrimaryDecoder, ToolkitDecoder, PipelineDecoder],
        "mkv" | "wmv" | "flv" => &[PipelineDecoder, PrimaryDecoder, ToolkitDecoder],
        "mov" => &[ToolkitDecoder, PipelineDecoder, PrimaryDecoder],
        "webm" => &[PipelineDecoder, ToolkitDecoder, PrimaryDecoder],
        _ => &[PrimaryDecoder, ToolkitDecoder, PipelineDecoder],
    }
}

/// Factory for the process-backed adapters configured in [`BackendsConfig`].
pub struct SystemBackends {
    config: BackendsConfig,
    available: BTreeSet<BackendKind>,
}

impl SystemBackends {
    pub fn new(config: BackendsConfig) -> Self {
        let available: BTreeSet<BackendKind> = BackendKind::ALL
            .into_iter()
            .filter(|kind| config.enabled(*kind) && program_on_path(config.program_for(*kind)))
            .collect();
        for kind in BackendKind::ALL {
            info!(
                backend = %kind,
                program = config.program_for(kind),
                available = available.contains(&kind),
                "media backend"
            );
        }
        Self { config, available }
    }
}

impl BackendFactory for SystemBackends {
    fn is_available(&self, kind: BackendKind) -> bool {
        self.available.contains(&kind)
    }

    fn create(&self, kind: BackendKind, events: EventSink) -> Box<dyn MediaBackend> {
        match kind {
            BackendKind::PrimaryDecoder => Box::new(FrameDecoderBackend::new(
                self.config.primary.clone(),
                events,
            )),
            BackendKind::ToolkitDecoder => {
                Box::new(ToolkitBackend::new(self.config.toolkit.clone(), events))
            }
            BackendKind::PipelineDecoder => {
                Box::new(PipelineBackend::new(self.config.pipeline.clone(), events))
            }
        }
    }
}
