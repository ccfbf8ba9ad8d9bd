#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use kiosk_player::backend::{BackendFactory, EventSink, MediaBackend, MediaKind};
use kiosk_player::engine::{EngineOptions, PlaybackEngine};
use kiosk_player::error::OpenError;
use kiosk_player::events::{BackendKind, BackendState, TaggedEvent};
use kiosk_player::playlist::{Playlist, PlaylistEntry};
use kiosk_player::presentation::Presentation;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// What the fake backends did, shared with the test body.
#[derive(Debug, Default)]
pub struct Ledger {
    pub attempts: Vec<BackendKind>,
    pub opens: Vec<(BackendKind, PathBuf)>,
    pub live: Vec<BackendKind>,
    pub plays: usize,
    pub pauses: usize,
    pub speeds: Vec<f32>,
    pub seeks: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shown {
    Image(PathBuf),
    Video(PathBuf, BackendKind),
    Preview(PathBuf),
    Hold,
    Background,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    pub ledger: Arc<Mutex<Ledger>>,
    pub failing: HashSet<BackendKind>,
    pub stuck: HashSet<BackendKind>,
    pub unavailable: HashSet<BackendKind>,
}

impl BackendFactory for FakeFactory {
    fn is_available(&self, kind: BackendKind) -> bool {
        !self.unavailable.contains(&kind)
    }

    fn create(&self, kind: BackendKind, events: EventSink) -> Box<dyn MediaBackend> {
        Box::new(FakeBackend {
            kind,
            ledger: Arc::clone(&self.ledger),
            fail_open: self.failing.contains(&kind),
            stuck: self.stuck.contains(&kind),
            state: BackendState::Stopped,
            _events: events,
        })
    }
}

struct FakeBackend {
    kind: BackendKind,
    ledger: Arc<Mutex<Ledger>>,
    fail_open: bool,
    stuck: bool,
    state: BackendState,
    _events: EventSink,
}

impl MediaBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn open(&mut self, path: &Path) -> Result<(), OpenError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.attempts.push(self.kind);
        if self.fail_open {
            return Err(OpenError::Rejected("refused".to_string()));
        }
        ledger.opens.push((self.kind, path.to_path_buf()));
        ledger.live.push(self.kind);
        self.state = BackendState::Opening;
        Ok(())
    }

    fn play(&mut self) {
        self.ledger.lock().unwrap().plays += 1;
        if !self.stuck && self.state.is_live() {
            self.state = BackendState::Playing;
        }
    }

    fn pause(&mut self) {
        self.ledger.lock().unwrap().pauses += 1;
        if self.state == BackendState::Playing {
            self.state = BackendState::Paused;
        }
    }

    fn stop(&mut self) {
        if self.state.is_live() {
            let mut ledger = self.ledger.lock().unwrap();
            if let Some(pos) = ledger.live.iter().position(|k| *k == self.kind) {
                ledger.live.remove(pos);
            }
        }
        self.state = BackendState::Stopped;
    }

    fn seek_relative(&mut self, delta_secs: i64) {
        self.ledger.lock().unwrap().seeks.push(delta_secs);
    }

    fn set_speed(&mut self, multiplier: f32) {
        self.ledger.lock().unwrap().speeds.push(multiplier);
    }

    fn state(&self) -> BackendState {
        self.state
    }
}

#[derive(Clone, Default)]
pub struct RecordingPresentation {
    pub shown: Arc<Mutex<Vec<Shown>>>,
    pub broken: HashSet<PathBuf>,
}

impl Presentation for RecordingPresentation {
    fn show_image(&mut self, path: &Path) -> Result<()> {
        if self.broken.contains(path) {
            bail!("cannot decode {}", path.display());
        }
        self.shown.lock().unwrap().push(Shown::Image(path.to_path_buf()));
        Ok(())
    }

    fn show_video(&mut self, path: &Path, kind: BackendKind) {
        self.shown
            .lock()
            .unwrap()
            .push(Shown::Video(path.to_path_buf(), kind));
    }

    fn show_preview(&mut self, path: &Path, _kind: MediaKind) -> Result<()> {
        self.shown.lock().unwrap().push(Shown::Preview(path.to_path_buf()));
        Ok(())
    }

    fn hold_frame(&mut self) {
        self.shown.lock().unwrap().push(Shown::Hold);
    }

    fn show_background(&mut self) {
        self.shown.lock().unwrap().push(Shown::Background);
    }
}

/// Media files on disk plus a playlist pointing at them. Names listed as
/// `missing` get an entry but no file; `repeat` stays a marker.
pub struct Fixture {
    pub dir: TempDir,
    pub playlist: Playlist,
}

impl Fixture {
    pub fn new(entries: &[(&str, u64)]) -> Self {
        Self::with_missing(entries, &[])
    }

    pub fn with_missing(entries: &[(&str, u64)], missing: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut list = Vec::new();
        for (name, secs) in entries {
            if name.eq_ignore_ascii_case("repeat") {
                list.push(PlaylistEntry::new(*name, *secs));
                continue;
            }
            let path = dir.path().join(name);
            if !missing.contains(name) {
                std::fs::write(&path, b"media").unwrap();
            }
            list.push(PlaylistEntry::new(path, *secs));
        }
        Self {
            dir,
            playlist: Playlist::from_entries(list),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub ledger: Arc<Mutex<Ledger>>,
    pub shown: Arc<Mutex<Vec<Shown>>>,
    pub events: UnboundedReceiver<TaggedEvent>,
}

impl Harness {
    pub fn new(playlist: Playlist) -> Self {
        Self::build(playlist, FakeFactory::default(), RecordingPresentation::default(), EngineOptions::default())
    }

    pub fn build(
        playlist: Playlist,
        factory: FakeFactory,
        presentation: RecordingPresentation,
        options: EngineOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger = Arc::clone(&factory.ledger);
        let shown = Arc::clone(&presentation.shown);
        let options = EngineOptions {
            shuffle_seed: Some(7),
            ..options
        };
        let engine = PlaybackEngine::new(
            playlist,
            options,
            Box::new(factory),
            Box::new(presentation),
            tx,
        );
        Self {
            engine,
            ledger,
            shown,
            events: rx,
        }
    }

    pub fn last_shown(&self) -> Option<Shown> {
        self.shown.lock().unwrap().last().cloned()
    }

    pub fn live(&self) -> Vec<BackendKind> {
        self.ledger.lock().unwrap().live.clone()
    }

    pub fn opens(&self) -> usize {
        self.ledger.lock().unwrap().opens.len()
    }
}
