use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EventSink;
use crate::error::OpenError;
use crate::events::{BackendEvent, BackendKind, BackendState};

/// How long a launched player must keep running before it counts as playing.
pub(crate) const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Whether `program` can be launched: an existing path, or a name found on `PATH`.
pub fn program_on_path(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Substitute `{path}` and `{uri}` in each argument. When no argument
/// mentions the media, the path is appended.
pub(crate) fn expand_args<'a, I>(template: I, media: &Path) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let path = media.display().to_string();
    let uri = file_uri(media);
    let mut mentioned = false;
    let mut out: Vec<String> = template
        .into_iter()
        .map(|arg| {
            if arg.contains("{path}") || arg.contains("{uri}") {
                mentioned = true;
            }
            arg.replace("{path}", &path).replace("{uri}", &uri)
        })
        .collect();
    if !mentioned {
        out.push(path);
    }
    out
}

fn file_uri(media: &Path) -> String {
    let absolute: PathBuf = std::path::absolute(media).unwrap_or_else(|_| media.to_path_buf());
    format!("file://{}", absolute.display())
}

/// An external player process under supervision.
///
/// A player is launched from a list of argument sets. When a launch exits
/// with a failure before it has survived [`STARTUP_GRACE`], the supervisor
/// starts the next set; only an exhausted list is reported as an error.
///
/// The state stays `Opening` until the running process has survived the
/// grace period, so `Playing` means the player is actually up. Pausing stops
/// the process (`SIGSTOP`), resuming continues it, and stopping kills it
/// synchronously.
pub(crate) struct ProcessPlayer {
    kind: BackendKind,
    events: EventSink,
    grace: Duration,
    child: Option<Supervised>,
    clock: PlayClock,
}

struct Supervised {
    program: String,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

/// Process state seen by both the adapter and its supervisor task.
#[derive(Debug)]
struct Shared {
    pid: Pid,
    state: BackendState,
    confirmed: bool,
    wants_play: bool,
}

impl Shared {
    /// Mark the current process as up; true when that makes it `Playing`.
    fn confirm(&mut self) -> bool {
        self.confirmed = true;
        if self.state == BackendState::Opening && self.wants_play {
            self.state = BackendState::Playing;
            true
        } else {
            false
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_player(program: &str, args: &[String]) -> Result<Child, OpenError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    let child = command.spawn().map_err(|source| OpenError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if child.id().is_none() {
        return Err(OpenError::Rejected(format!(
            "{program} exited before it could be supervised"
        )));
    }
    Ok(child)
}

fn child_pid(child: &Child) -> Pid {
    Pid::from_raw(child.id().unwrap_or_default() as i32)
}

impl ProcessPlayer {
    pub(crate) fn new(kind: BackendKind, events: EventSink) -> Self {
        Self::with_grace(kind, events, STARTUP_GRACE)
    }

    pub(crate) fn with_grace(kind: BackendKind, events: EventSink, grace: Duration) -> Self {
        Self {
            kind,
            events,
            grace,
            child: None,
            clock: PlayClock::default(),
        }
    }

    pub(crate) fn launch(&mut self, program: &str, args: &[String]) -> Result<(), OpenError> {
        self.launch_any(program, vec![args.to_vec()])
    }

    /// Launch `program` with the first argument set that spawns. The sets
    /// left over stay with the supervisor for startup failures.
    pub(crate) fn launch_any(
        &mut self,
        program: &str,
        attempts: Vec<Vec<String>>,
    ) -> Result<(), OpenError> {
        self.stop();

        let mut remaining: VecDeque<Vec<String>> = attempts.into();
        let mut last_err = None;
        let child = loop {
            let Some(args) = remaining.pop_front() else {
                return Err(last_err.unwrap_or_else(|| {
                    OpenError::Rejected(format!("no arguments configured for {program}"))
                }));
            };
            match spawn_player(program, &args) {
                Ok(child) => {
                    info!(backend = %self.kind, program, pid = ?child.id(), ?args, "player launched");
                    break child;
                }
                Err(err) => {
                    warn!(backend = %self.kind, program, ?args, "launch failed: {err}");
                    last_err = Some(err);
                }
            }
        };

        let shared = Arc::new(Mutex::new(Shared {
            pid: child_pid(&child),
            state: BackendState::Opening,
            confirmed: false,
            wants_play: false,
        }));
        let cancel = CancellationToken::new();
        tokio::spawn(supervise(
            child,
            Launcher {
                program: program.to_string(),
                remaining,
                grace: self.grace,
            },
            Arc::clone(&shared),
            self.events.clone(),
            cancel.clone(),
        ));

        self.child = Some(Supervised {
            program: program.to_string(),
            shared,
            cancel,
        });
        Ok(())
    }

    pub(crate) fn play(&mut self) {
        let Some(child) = &self.child else {
            return;
        };
        let now_playing = {
            let mut shared = lock(&child.shared);
            shared.wants_play = true;
            match shared.state {
                BackendState::Paused => {
                    signal(shared.pid, &child.program, Signal::SIGCONT);
                    shared.state = if shared.confirmed {
                        BackendState::Playing
                    } else {
                        BackendState::Opening
                    };
                }
                BackendState::Opening if shared.confirmed => {
                    shared.state = BackendState::Playing;
                }
                BackendState::Opening => {}
                _ => return,
            }
            shared.state == BackendState::Playing
        };
        self.clock.resume();
        if now_playing {
            self.events
                .emit(BackendEvent::StateChanged(BackendState::Playing));
        }
    }

    pub(crate) fn pause(&mut self) {
        let Some(child) = &self.child else {
            return;
        };
        {
            let mut shared = lock(&child.shared);
            if !matches!(shared.state, BackendState::Opening | BackendState::Playing) {
                return;
            }
            shared.state = BackendState::Paused;
            shared.wants_play = false;
            signal(shared.pid, &child.program, Signal::SIGSTOP);
        }
        self.clock.pause();
        self.events
            .emit(BackendEvent::StateChanged(BackendState::Paused));
    }

    pub(crate) fn stop(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };
        {
            let mut shared = lock(&child.shared);
            if shared.state.is_live() {
                signal(shared.pid, &child.program, Signal::SIGKILL);
            }
            shared.state = BackendState::Stopped;
        }
        child.cancel.cancel();
        self.clock = PlayClock::default();
        debug!(backend = %self.kind, program = %child.program, "player released");
    }

    pub(crate) fn state(&self) -> BackendState {
        self.child
            .as_ref()
            .map_or(BackendState::Stopped, |child| lock(&child.shared).state)
    }

    pub(crate) fn position(&self) -> Duration {
        self.clock.elapsed()
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn signal(pid: Pid, program: &str, sig: Signal) {
    if let Err(err) = kill(pid, sig) {
        warn!(program, %pid, ?sig, "failed to signal player: {err}");
    }
}

/// What the supervisor needs to start the next argument set.
struct Launcher {
    program: String,
    remaining: VecDeque<Vec<String>>,
    grace: Duration,
}

async fn supervise(
    mut child: Child,
    mut launcher: Launcher,
    shared: Arc<Mutex<Shared>>,
    events: EventSink,
    cancel: CancellationToken,
) {
    let program = launcher.program.clone();
    loop {
        let grace = tokio::time::sleep(launcher.grace);
        tokio::pin!(grace);
        let mut survived = false;

        let status = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if let Err(err) = child.kill().await {
                        debug!(program = %program, "reaping released player: {err}");
                    }
                    return;
                }

                status = child.wait() => break status,

                _ = &mut grace, if !survived => {
                    survived = true;
                    let playing = lock(&shared).confirm();
                    debug!(program = %program, "player survived startup");
                    if playing {
                        events.emit(BackendEvent::StateChanged(BackendState::Playing));
                    }
                }
            }
        };

        let failed = !matches!(&status, Ok(s) if s.success());
        if failed && !survived {
            if let Some(next) = relaunch(&mut launcher, &shared, &status) {
                child = next;
                continue;
            }
        }

        let (next, event) = exit_outcome(&program, status);
        let mut state = lock(&shared);
        if state.state.is_live() {
            state.state = next;
            drop(state);
            debug!(program = %program, state = ?next, "player exited");
            events.emit(event);
        }
        return;
    }
}

/// Start the next argument set after a startup failure. Gives up when the
/// player was released or every set has been tried.
fn relaunch(
    launcher: &mut Launcher,
    shared: &Mutex<Shared>,
    status: &std::io::Result<ExitStatus>,
) -> Option<Child> {
    let program = launcher.program.as_str();
    let mut state = lock(shared);
    if !state.state.is_live() {
        return None;
    }
    while let Some(args) = launcher.remaining.pop_front() {
        warn!(program, ?status, ?args, "player failed during startup; trying next arguments");
        match spawn_player(program, &args) {
            Ok(child) => {
                state.pid = child_pid(&child);
                state.confirmed = false;
                if state.state == BackendState::Paused {
                    signal(state.pid, program, Signal::SIGSTOP);
                }
                return Some(child);
            }
            Err(err) => warn!(program, ?args, "launch failed: {err}"),
        }
    }
    None
}

fn exit_outcome(
    program: &str,
    status: std::io::Result<ExitStatus>,
) -> (BackendState, BackendEvent) {
    match status {
        Ok(status) if status.success() => (BackendState::Ended, BackendEvent::EndOfMedia),
        Ok(status) => (
            BackendState::Failed,
            BackendEvent::Error(format!("{program} exited with {status}")),
        ),
        Err(err) => (
            BackendState::Failed,
            BackendEvent::Error(format!("waiting for {program} failed: {err}")),
        ),
    }
}

/// Wall-clock playback position, excluding paused spans.
#[derive(Debug, Default)]
struct PlayClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl PlayClock {
    fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |s| s.elapsed())
    }
}
