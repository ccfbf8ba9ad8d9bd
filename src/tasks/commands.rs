use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::CommandMailbox;
use crate::error::CommandError;
use crate::events::PlayerCommand;

/// Poll the command file and forward each play request to the player.
#[instrument(
    skip(mailbox, to_player, cancel),
    fields(path = %mailbox.path().display())
)]
pub async fn run(
    mut mailbox: CommandMailbox,
    poll_interval: Duration,
    to_player: Sender<PlayerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every = %humantime::format_duration(poll_interval), "polling for play requests");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("cancel received; exiting command poller");
                break;
            }

            _ = ticker.tick() => {
                match mailbox.poll_once() {
                    Ok(Some(request)) => {
                        info!(path = %request.path.display(), duration_secs = request.duration_secs, "play request received");
                        if to_player.send(PlayerCommand::Inject(request)).await.is_err() {
                            debug!("player gone; exiting command poller");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(CommandError::Malformed(record)) => {
                        warn!(record = %record, "ignoring malformed play request");
                    }
                    Err(err) => warn!("failed to poll command file: {err}"),
                }
            }
        }
    }
    Ok(())
}
