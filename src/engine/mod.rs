//! The playback state machine.
//!
//! The engine is synchronous and clock-agnostic: every operation that may
//! arm a timer takes the current `Instant`, and the owning task calls
//! [`PlaybackEngine::on_tick`] once [`PlaybackEngine::next_deadline`] passes.

mod state;
mod timer;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendFactory, BackendPreferences, EventSink, MediaBackend, MediaKind};
use crate::events::{
    BackendEvent, BackendKind, BackendState, PlayRequest, PlayerCommand, Shutdown, TaggedEvent,
    Ticket,
};
use crate::playlist::{Playlist, PlaylistEntry};
use crate::presentation::Presentation;

pub use state::{EngineOptions, EngineState, Phase};
use state::clamp_speed;
use timer::TimerSlot;

/// What the advancement slot does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The current entry ran its course.
    Complete,
    /// Dispatch whatever entry `current_index` names.
    Retry,
}

/// The backend currently holding a resource.
struct ActiveMedia {
    backend: Box<dyn MediaBackend>,
    ticket: Ticket,
    path: PathBuf,
    duration_secs: u64,
    /// Passed the liveness check.
    confirmed: bool,
    /// Kinds still to try if this one turns out dead.
    fallbacks: VecDeque<BackendKind>,
}

/// Timers frozen by `pause_at_frame`.
#[derive(Debug, Default)]
struct Frozen {
    step: Option<(Duration, Step)>,
    liveness: Option<(Duration, Ticket)>,
}

pub struct PlaybackEngine {
    playlist: Playlist,
    options: EngineOptions,
    preferences: BackendPreferences,
    factory: Box<dyn BackendFactory>,
    presentation: Box<dyn Presentation>,
    events: UnboundedSender<TaggedEvent>,
    state: EngineState,
    active: Option<ActiveMedia>,
    step: TimerSlot<Step>,
    liveness: TimerSlot<Ticket>,
    frozen: Option<Frozen>,
    last_ticket: u64,
    shutdown: Option<Shutdown>,
    rng: StdRng,
}

impl PlaybackEngine {
    pub fn new(
        playlist: Playlist,
        options: EngineOptions,
        factory: Box<dyn BackendFactory>,
        presentation: Box<dyn Presentation>,
        events: UnboundedSender<TaggedEvent>,
    ) -> Self {
        let rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            preferences: BackendPreferences::with_overrides(options.backend_preferences.clone()),
            state: EngineState::new(options.single_file, options.speed),
            playlist,
            options,
            factory,
            presentation,
            events,
            active: None,
            step: TimerSlot::default(),
            liveness: TimerSlot::default(),
            frozen: None,
            last_ticket: 0,
            shutdown: None,
            rng,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Ticket of the backend currently holding a resource.
    pub fn active_ticket(&self) -> Option<Ticket> {
        self.active.as_ref().map(|a| a.ticket)
    }

    /// Set once the engine wants the process to end.
    pub fn shutdown_requested(&self) -> Option<Shutdown> {
        self.shutdown
    }

    /// Earliest armed timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.step.deadline(), self.liveness.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle(&mut self, command: PlayerCommand, now: Instant) {
        debug!(?command, "control command");
        match command {
            PlayerCommand::Start => self.start(now),
            PlayerCommand::TogglePause => self.toggle_play_pause(now),
            PlayerCommand::Stop => self.stop_and_return_to_background(),
            PlayerCommand::Next => self.next(now),
            PlayerCommand::Previous => self.previous(now),
            PlayerCommand::SeekRelative(secs) => self.seek_relative(secs),
            PlayerCommand::ChangeSpeed(delta) => self.change_speed(delta),
            PlayerCommand::ToggleRepeat => self.toggle_repeat(),
            PlayerCommand::Shuffle => self.shuffle(now),
            PlayerCommand::Inject(request) => self.inject(request, now),
            PlayerCommand::Quit => self.finish(Shutdown::Completed),
        }
    }

    pub fn start(&mut self, now: Instant) {
        match self.state.phase {
            Phase::Playing => debug!("already playing"),
            Phase::PausedAtFrame => self.resume(now),
            Phase::Idle | Phase::Stopped => {
                info!(index = self.state.current_index, "starting playback");
                self.state.phase = Phase::Playing;
                self.advance(false, now);
            }
        }
    }

    /// Continue from a held frame without reopening, or start fresh.
    pub fn resume(&mut self, now: Instant) {
        match self.state.phase {
            Phase::Playing => {}
            Phase::Idle | Phase::Stopped => self.start(now),
            Phase::PausedAtFrame => {
                self.state.phase = Phase::Playing;
                let frozen = self.frozen.take().unwrap_or_default();
                let held = match self.active.as_mut() {
                    Some(active) if active.backend.state().is_live() => {
                        active.backend.play();
                        true
                    }
                    Some(_) => false,
                    None => frozen.step.is_some(),
                };
                if held {
                    if let Some((left, step)) = frozen.step {
                        self.step.arm(now + left, step);
                    }
                    if let Some((left, ticket)) = frozen.liveness {
                        self.liveness.arm(now + left, ticket);
                    }
                    info!(index = self.state.current_index, "resumed");
                } else {
                    debug!("held media no longer valid; restarting entry");
                    self.advance(false, now);
                }
            }
        }
    }

    /// Freeze on the current frame, keeping the backend resource.
    pub fn pause_at_frame(&mut self, now: Instant) {
        if !self.state.is_playing() {
            return;
        }
        self.frozen = Some(Frozen {
            step: self.step.freeze(now),
            liveness: self.liveness.freeze(now),
        });
        if let Some(active) = self.active.as_mut() {
            active.backend.pause();
            debug!(backend = %active.backend.kind(), position = ?active.backend.position(), "backend paused");
        }
        self.presentation.hold_frame();
        self.state.phase = Phase::PausedAtFrame;
        info!(index = self.state.current_index, "paused at frame");
    }

    pub fn toggle_play_pause(&mut self, now: Instant) {
        if self.state.is_playing() {
            self.pause_at_frame(now);
        } else {
            self.resume(now);
        }
    }

    /// Release everything and show the background.
    pub fn stop_and_return_to_background(&mut self) {
        self.reset_entry();
        self.state.phase = Phase::Stopped;
        self.presentation.show_background();
        info!(index = self.state.current_index, "stopped");
    }

    /// Step forward without wrapping. At the last real entry the same entry
    /// is shown again, as a preview when not playing.
    pub fn next(&mut self, now: Instant) {
        self.reset_entry();
        if self.playlist.is_empty() {
            self.state.current_index = 0;
            return;
        }
        let index = self.clamped_index();
        match self.playlist.step_forward(index) {
            Some(next) => {
                self.state.current_index = next;
                self.state.phase = Phase::Playing;
                self.advance(false, now);
            }
            None if self.state.is_playing() => {
                debug!(index, "already at the last entry");
                self.advance(false, now);
            }
            None => {
                if self.state.is_paused_at_frame() {
                    self.state.phase = Phase::Stopped;
                }
                self.preview(index);
            }
        }
    }

    /// Step backward, wrapping past the first entry.
    pub fn previous(&mut self, now: Instant) {
        self.reset_entry();
        if self.playlist.is_empty() {
            self.state.current_index = 0;
            return;
        }
        let index = self.clamped_index();
        self.state.current_index = self.playlist.step_back(index);
        self.state.phase = Phase::Playing;
        self.advance(false, now);
    }

    /// Move to and dispatch the next entry. With `auto_advance` the entry
    /// that just completed is stepped past first (unless repeating).
    pub fn advance(&mut self, auto_advance: bool, now: Instant) {
        if !self.state.is_playing() {
            return;
        }
        self.reset_entry();
        if self.playlist.is_empty() {
            warn!("playlist is empty; nothing to play");
            self.state.current_index = 0;
            self.presentation.show_background();
            return;
        }
        let mut index = self.clamped_index();
        if auto_advance && !self.state.repeat_current {
            index = self.playlist.wrap_next(index);
        }
        let Some(index) = self.playlist.resolve_playable(index) else {
            error!("playlist holds only repeat markers; no valid content");
            self.state.current_index = 0;
            self.finish(Shutdown::Failed);
            return;
        };
        self.state.current_index = index;
        self.dispatch(index, now);
    }

    /// Splice a one-shot request into the playlist and play it now.
    pub fn inject(&mut self, request: PlayRequest, now: Instant) {
        self.reset_entry();
        let after = self.clamped_index();
        let index = self
            .playlist
            .upsert(&request.path, request.duration_secs, after);
        info!(
            path = %request.path.display(),
            duration_secs = request.duration_secs,
            index,
            "play request spliced into playlist"
        );
        self.state.current_index = index;
        self.state.phase = Phase::Playing;
        self.advance(false, now);
    }

    pub fn seek_relative(&mut self, delta_secs: i64) {
        match self.active.as_mut() {
            Some(active) => active.backend.seek_relative(delta_secs),
            None => debug!(delta_secs, "nothing to seek"),
        }
    }

    pub fn change_speed(&mut self, delta: f32) {
        self.set_speed(self.state.speed + delta);
    }

    pub fn set_speed(&mut self, multiplier: f32) {
        let speed = clamp_speed(multiplier);
        self.state.speed = speed;
        if let Some(active) = self.active.as_mut() {
            active.backend.set_speed(speed);
        }
        info!(speed, "playback speed");
    }

    pub fn toggle_repeat(&mut self) {
        self.state.repeat_current = !self.state.repeat_current;
        info!(repeat_current = self.state.repeat_current, "repeat toggled");
    }

    /// Shuffle the playlist and start over from its first entry.
    pub fn shuffle(&mut self, now: Instant) {
        self.reset_entry();
        self.playlist.shuffle(&mut self.rng);
        self.state.current_index = 0;
        info!(entries = self.playlist.len(), "playlist shuffled");
        if self.state.is_playing() {
            self.advance(false, now);
        }
    }

    /// Fire whichever timers are due.
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(ticket) = self.liveness.take_due(now) {
            self.check_liveness(ticket, now);
        }
        match self.step.take_due(now) {
            Some(Step::Complete) => self.complete_entry(now),
            Some(Step::Retry) => self.advance(false, now),
            None => {}
        }
    }

    pub fn on_backend_event(&mut self, tagged: TaggedEvent, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            debug!(ticket = tagged.ticket.0, event = ?tagged.event, "event with no active backend dropped");
            return;
        };
        if active.ticket != tagged.ticket {
            debug!(ticket = tagged.ticket.0, event = ?tagged.event, "stale backend event dropped");
            return;
        }
        match tagged.event {
            BackendEvent::StateChanged(state) => {
                debug!(backend = %active.backend.kind(), ?state, "backend state");
            }
            BackendEvent::EndOfMedia => {
                info!(path = %active.path.display(), "end of media");
                if self.state.is_playing() {
                    self.complete_entry(now);
                } else {
                    self.release_active();
                }
            }
            BackendEvent::Error(message) if !active.confirmed => {
                warn!(backend = %active.backend.kind(), "backend failed while starting: {message}");
                self.fall_back(now);
            }
            BackendEvent::Error(message) => {
                error!(backend = %active.backend.kind(), path = %active.path.display(), "playback error: {message}");
                self.reset_entry();
                self.entry_failed(now);
            }
        }
    }

    fn clamped_index(&mut self) -> usize {
        let len = self.playlist.len();
        if self.state.current_index >= len && len > 0 {
            warn!(
                index = self.state.current_index,
                len,
                "playlist index out of range; resetting"
            );
            self.state.current_index = 0;
        } else if len == 0 {
            self.state.current_index = 0;
        }
        self.state.current_index
    }

    /// Cancel per-entry timers and release the active backend.
    fn reset_entry(&mut self) {
        self.step.cancel();
        self.liveness.cancel();
        self.frozen = None;
        self.release_active();
    }

    fn release_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.backend.close();
            debug!(backend = %active.backend.kind(), ticket = active.ticket.0, "backend released");
        }
        self.state.active_backend = None;
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.last_ticket += 1;
        Ticket(self.last_ticket)
    }

    fn finish(&mut self, reason: Shutdown) {
        self.reset_entry();
        if self.shutdown.is_none() {
            info!(?reason, "shutdown requested");
            self.shutdown = Some(reason);
        }
    }

    fn complete_entry(&mut self, now: Instant) {
        if self.state.single_file {
            self.finish(Shutdown::Completed);
        } else {
            self.advance(true, now);
        }
    }

    /// Move past an entry that could not be shown and retry after `delay`.
    fn skip_entry(&mut self, index: usize, delay: Duration, now: Instant) {
        self.state.current_index = self.playlist.wrap_next(index);
        self.step.arm(now + delay, Step::Retry);
    }

    fn entry_failed(&mut self, now: Instant) {
        if self.state.single_file {
            self.finish(Shutdown::Failed);
            return;
        }
        let index = self.state.current_index;
        self.skip_entry(index, self.options.failed_entry_retry, now);
    }

    fn dispatch(&mut self, index: usize, now: Instant) {
        let Some(entry) = self.playlist.get(index).cloned() else {
            return;
        };
        if !entry.path.exists() {
            warn!(index, path = %entry.path.display(), "media file not found");
            if self.state.single_file {
                self.finish(Shutdown::Failed);
            } else if self.playlist.len() > 1 {
                self.skip_entry(index, self.options.missing_file_retry, now);
            } else {
                error!("no valid content to play");
                self.finish(Shutdown::Failed);
            }
            return;
        }
        match MediaKind::of(&entry.path) {
            MediaKind::Image => self.show_image(index, &entry, now),
            MediaKind::Video => {
                let candidates: VecDeque<BackendKind> = self
                    .preferences
                    .order_for(&entry.path)
                    .into_iter()
                    .filter(|kind| self.factory.is_available(*kind))
                    .collect();
                self.open_video(entry.path, entry.duration_secs, candidates, now);
            }
        }
    }

    fn show_image(&mut self, index: usize, entry: &PlaylistEntry, now: Instant) {
        match self.presentation.show_image(&entry.path) {
            Ok(()) => {
                info!(index, path = %entry.path.display(), duration_secs = entry.duration_secs, "image");
                self.step.arm(
                    now + Duration::from_secs(entry.duration_secs),
                    Step::Complete,
                );
            }
            Err(err) => {
                warn!(index, path = %entry.path.display(), "failed to load image: {err:#}");
                if self.state.single_file {
                    self.finish(Shutdown::Failed);
                } else {
                    self.skip_entry(index, self.options.missing_file_retry, now);
                }
            }
        }
    }

    /// Try each candidate kind in order until one opens.
    fn open_video(
        &mut self,
        path: PathBuf,
        duration_secs: u64,
        mut candidates: VecDeque<BackendKind>,
        now: Instant,
    ) {
        while let Some(kind) = candidates.pop_front() {
            let ticket = self.issue_ticket();
            let mut backend = self
                .factory
                .create(kind, EventSink::new(ticket, self.events.clone()));
            backend.set_speed(self.state.speed);
            match backend.open(&path) {
                Ok(()) => {
                    backend.play();
                    self.presentation.show_video(&path, kind);
                    info!(
                        index = self.state.current_index,
                        path = %path.display(),
                        backend = %kind,
                        ticket = ticket.0,
                        "video"
                    );
                    self.state.active_backend = Some(kind);
                    self.liveness.arm(now + self.options.liveness_timeout, ticket);
                    if duration_secs > 0 {
                        self.step
                            .arm(now + Duration::from_secs(duration_secs), Step::Complete);
                    }
                    self.active = Some(ActiveMedia {
                        backend,
                        ticket,
                        path,
                        duration_secs,
                        confirmed: false,
                        fallbacks: candidates,
                    });
                    return;
                }
                Err(err) => {
                    warn!(backend = %kind, path = %path.display(), "open failed: {err}");
                    backend.close();
                }
            }
        }
        error!(path = %path.display(), "no backend could play the file");
        self.entry_failed(now);
    }

    fn check_liveness(&mut self, ticket: Ticket, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.ticket != ticket {
            return;
        }
        let state = active.backend.state();
        if state == BackendState::Playing {
            active.confirmed = true;
            debug!(backend = %active.backend.kind(), "backend confirmed playing");
        } else {
            warn!(backend = %active.backend.kind(), ?state, "backend never reached playing");
            self.fall_back(now);
        }
    }

    /// Tear down the active backend and try the kinds that remain.
    fn fall_back(&mut self, now: Instant) {
        self.step.cancel();
        self.liveness.cancel();
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.backend.close();
        self.state.active_backend = None;
        self.open_video(active.path, active.duration_secs, active.fallbacks, now);
    }

    fn preview(&mut self, index: usize) {
        let Some(entry) = self.playlist.get(index) else {
            return;
        };
        if entry.is_repeat_marker() {
            return;
        }
        let path: &Path = &entry.path;
        if let Err(err) = self.presentation.show_preview(path, MediaKind::of(path)) {
            warn!(index, path = %path.display(), "preview failed: {err:#}");
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release_active();
    }
}
