//! Presentation surface driven by the playback engine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageReader;
use tracing::{debug, info, warn};

use crate::backend::MediaKind;
use crate::events::BackendKind;

/// Consumer of the engine's rendering requests. The engine never draws
/// anything itself.
pub trait Presentation: Send {
    /// Display a still image. An error means the image could not be loaded.
    fn show_image(&mut self, path: &Path) -> Result<()>;

    /// A backend of `kind` is now rendering `path`.
    fn show_video(&mut self, path: &Path, kind: BackendKind);

    /// Show an entry without starting playback: the image itself, or the
    /// first frame of a video.
    fn show_preview(&mut self, path: &Path, kind: MediaKind) -> Result<()>;

    /// Keep whatever is on screen.
    fn hold_frame(&mut self);

    fn show_background(&mut self);
}

/// Presentation for a display managed by the external players: images are
/// probed so unreadable files are reported, everything else is logged.
#[derive(Debug, Default)]
pub struct HeadlessPresentation {
    background: Option<PathBuf>,
}

impl HeadlessPresentation {
    pub fn new(background: Option<PathBuf>) -> Self {
        Self { background }
    }
}

fn probe_image(path: &Path) -> Result<(u32, u32)> {
    ImageReader::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image header {}", path.display()))?
        .into_dimensions()
        .with_context(|| format!("failed to decode image {}", path.display()))
}

impl Presentation for HeadlessPresentation {
    fn show_image(&mut self, path: &Path) -> Result<()> {
        let (width, height) = probe_image(path)?;
        info!(path = %path.display(), width, height, "showing image");
        Ok(())
    }

    fn show_video(&mut self, path: &Path, kind: BackendKind) {
        info!(path = %path.display(), backend = %kind, "showing video");
    }

    fn show_preview(&mut self, path: &Path, kind: MediaKind) -> Result<()> {
        if kind == MediaKind::Image {
            probe_image(path)?;
        }
        info!(path = %path.display(), ?kind, "showing preview");
        Ok(())
    }

    fn hold_frame(&mut self) {
        debug!("holding last frame");
    }

    fn show_background(&mut self) {
        match &self.background {
            Some(bg) if bg.is_file() => info!(background = %bg.display(), "showing background"),
            Some(bg) => warn!(background = %bg.display(), "background image missing; showing blank screen"),
            None => info!("showing blank background"),
        }
    }
}
