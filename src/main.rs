use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use kiosk_player::backend::SystemBackends;
use kiosk_player::command::{CommandMailbox, InstanceLock};
use kiosk_player::config::Configuration;
use kiosk_player::engine::{EngineOptions, PlaybackEngine};
use kiosk_player::events::{PlayRequest, PlayerCommand, Shutdown, TaggedEvent};
use kiosk_player::playlist::Playlist;
use kiosk_player::presentation::HeadlessPresentation;
use kiosk_player::tasks;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kiosk-player", about = "Full-screen kiosk playlist player")]
struct Args {
    /// Load a playlist (default from configuration) and play it continuously
    #[arg(long, value_name = "PLAYLIST", num_args = 0..=1, conflicts_with = "play")]
    start: Option<Option<PathBuf>>,

    /// Play one file for DURATION seconds; handed to the running instance if there is one
    #[arg(long, num_args = 2, value_names = ["FILE", "DURATION"])]
    play: Option<Vec<String>>,

    /// With --play, exit once the file has been shown instead of continuing with the playlist
    #[arg(long, requires = "play")]
    exit_after: bool,

    /// Refuse to start when another instance is running
    #[arg(long)]
    single_instance: bool,

    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn parse_play(values: &[String]) -> Result<PlayRequest> {
    let [file, duration] = values else {
        bail!("--play expects FILE and DURATION");
    };
    let duration_secs = duration
        .trim()
        .parse::<u64>()
        .with_context(|| format!("invalid --play duration {duration:?}"))?;
    Ok(PlayRequest {
        path: PathBuf::from(file),
        duration_secs,
    })
}

/// Load `path`, writing the sample playlist first when it does not exist yet.
fn load_or_create(path: &Path) -> Playlist {
    if !path.exists() {
        if let Err(err) = Playlist::write_sample(path) {
            tracing::warn!("failed to create sample playlist: {err:#}");
        } else {
            tracing::info!("add your media files and update {}", path.display());
        }
    }
    Playlist::load(path)
}

async fn run(args: Args) -> Result<ExitCode> {
    let cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?
            .validated()
            .context("invalid configuration values")?,
        None => Configuration::default(),
    };
    tracing::debug!("configuration: {cfg:#?}");

    let play = args.play.as_deref().map(parse_play).transpose()?;
    if let Some(request) = &play
        && !request.path.is_file()
    {
        tracing::error!(path = %request.path.display(), "file to play does not exist");
        return Ok(ExitCode::FAILURE);
    }

    let lock = InstanceLock::acquire(&cfg.lock_path)?;
    if lock.is_none() {
        if let Some(request) = &play {
            CommandMailbox::new(&cfg.command_path)
                .send(request)
                .context("failed to hand off play request")?;
            return Ok(ExitCode::SUCCESS);
        }
        if args.single_instance {
            tracing::error!(lock = %cfg.lock_path.display(), "another instance is already running");
            return Ok(ExitCode::FAILURE);
        }
        tracing::warn!("another instance is running; remote play requests will not be received here");
    }

    let single_file = play.is_some() && args.exit_after;
    let (playlist, initial) = match play {
        Some(request) if single_file => (
            Playlist::single(&request.path, request.duration_secs),
            PlayerCommand::Start,
        ),
        Some(request) => (
            load_or_create(&cfg.playlist_path),
            PlayerCommand::Inject(request),
        ),
        None => {
            let path = args
                .start
                .flatten()
                .unwrap_or_else(|| cfg.playlist_path.clone());
            (load_or_create(&path), PlayerCommand::Start)
        }
    };
    tracing::info!(entries = playlist.len(), single_file, "playlist ready");

    let cancel = CancellationToken::new();
    let (backend_tx, backend_rx) = mpsc::unbounded_channel::<TaggedEvent>(); // Backends -> Player
    let (control_tx, control_rx) = mpsc::channel::<PlayerCommand>(16); // Controls/Commands -> Player

    let engine = PlaybackEngine::new(
        playlist,
        EngineOptions {
            single_file,
            ..EngineOptions::from(&cfg)
        },
        Box::new(SystemBackends::new(cfg.backends.clone())),
        Box::new(HeadlessPresentation::new(cfg.background_image.clone())),
        backend_tx,
    );
    control_tx
        .send(initial)
        .await
        .context("player control channel closed")?;

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Controls
    tasks.spawn({
        let control_tx = control_tx.clone();
        let cancel = cancel.clone();
        async move {
            tasks::controls::run(control_tx, cancel)
                .await
                .context("controls task failed")
        }
    });

    // Command poller, only for the instance that owns the lock
    if lock.is_some() {
        tasks.spawn({
            let mailbox = CommandMailbox::new(&cfg.command_path);
            let control_tx = control_tx.clone();
            let cancel = cancel.clone();
            let poll = cfg.command_poll_interval;
            async move {
                tasks::commands::run(mailbox, poll, control_tx, cancel)
                    .await
                    .context("command task failed")
            }
        });
    }
    drop(control_tx);

    let outcome = match tasks::player::run(engine, backend_rx, control_rx, cancel.clone())
        .await
        .context("player task failed")
    {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("{err:?}");
            Shutdown::Failed
        }
    };
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }
    drop(lock);

    Ok(ExitCode::from(outcome.exit_code()))
}
