use std::io::{BufRead, IsTerminal};

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::PlayerCommand;

pub const SPEED_STEP: f32 = 0.25;
pub const SEEK_STEP_SECS: i64 = 10;

/// Map one terminal line to a command. A line holding only spaces is the
/// space bar.
pub fn parse_control(line: &str) -> Option<PlayerCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    let key = if !line.is_empty() && line.trim().is_empty() {
        "space".to_string()
    } else {
        line.trim().to_ascii_lowercase()
    };
    let command = match key.as_str() {
        "n" | "next" => PlayerCommand::Next,
        "p" | "prev" | "previous" => PlayerCommand::Previous,
        "space" | "pause" | "play" => PlayerCommand::TogglePause,
        "s" | "stop" => PlayerCommand::Stop,
        "start" => PlayerCommand::Start,
        "+" => PlayerCommand::ChangeSpeed(SPEED_STEP),
        "-" => PlayerCommand::ChangeSpeed(-SPEED_STEP),
        "f" => PlayerCommand::SeekRelative(SEEK_STEP_SECS),
        "b" => PlayerCommand::SeekRelative(-SEEK_STEP_SECS),
        "r" | "repeat" => PlayerCommand::ToggleRepeat,
        "x" | "shuffle" => PlayerCommand::Shuffle,
        "q" | "quit" => PlayerCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Forward terminal keys and `SIGUSR1`/`SIGUSR2` to the player. Closing a
/// terminal stdin (Ctrl-D) cancels the pipeline.
pub async fn run(to_player: Sender<PlayerCommand>, cancel: CancellationToken) -> Result<()> {
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("failed to register SIGUSR1 handler")?;
    let mut sigusr2 =
        signal(SignalKind::user_defined2()).context("failed to register SIGUSR2 handler")?;

    // Blocking stdin reads run on a plain thread, outside the runtime.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(8);
    let stdin_open = std::io::stdin().is_terminal();
    if stdin_open {
        std::thread::Builder::new()
            .name("stdin-controls".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if line_tx.blocking_send(line).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!("stdin watcher failed: {err}");
                            return;
                        }
                    }
                }
            })
            .context("failed to spawn stdin reader")?;
    } else {
        debug!("stdin is not a terminal; key controls disabled");
    }

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,

            line = line_rx.recv(), if stdin_open => match line {
                Some(line) => match parse_control(&line) {
                    Some(command) => command,
                    None => {
                        debug!(line = %line, "unknown control key");
                        continue;
                    }
                },
                None => {
                    info!("stdin closed; initiating shutdown");
                    cancel.cancel();
                    break;
                }
            },

            Some(()) = sigusr1.recv() => {
                info!("SIGUSR1 received; toggling pause");
                PlayerCommand::TogglePause
            }

            Some(()) = sigusr2.recv() => {
                info!("SIGUSR2 received; skipping to next entry");
                PlayerCommand::Next
            }
        };
        if to_player.send(command).await.is_err() {
            debug!("player gone; exiting controls");
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_keys_to_commands() {
        assert_eq!(parse_control("n"), Some(PlayerCommand::Next));
        assert_eq!(parse_control("PREV\n"), Some(PlayerCommand::Previous));
        assert_eq!(parse_control(" "), Some(PlayerCommand::TogglePause));
        assert_eq!(parse_control("+"), Some(PlayerCommand::ChangeSpeed(0.25)));
        assert_eq!(parse_control("b"), Some(PlayerCommand::SeekRelative(-10)));
        assert_eq!(parse_control("q"), Some(PlayerCommand::Quit));
    }

    #[test]
    fn ignores_unknown_and_empty_lines() {
        assert_eq!(parse_control(""), None);
        assert_eq!(parse_control("\n"), None);
        assert_eq!(parse_control("zoom"), None);
    }
}
