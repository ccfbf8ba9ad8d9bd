use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::PlaybackEngine;
use crate::events::{PlayerCommand, Shutdown, TaggedEvent};

/// Idle wake-up when no timer is armed.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Owns the engine and feeds it timers, backend events and control commands
/// until the engine asks to terminate or `cancel` fires.
///
/// Whichever way the loop ends, `cancel` is triggered so sibling tasks stop too.
pub async fn run(
    mut engine: PlaybackEngine,
    mut backend_rx: UnboundedReceiver<TaggedEvent>,
    mut control_rx: Receiver<PlayerCommand>,
    cancel: CancellationToken,
) -> Result<Shutdown> {
    let mut controls_open = true;

    let outcome = loop {
        if let Some(reason) = engine.shutdown_requested() {
            break reason;
        }

        let deadline = engine
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; stopping playback");
                break Shutdown::Completed;
            }

            Some(event) = backend_rx.recv() => {
                engine.on_backend_event(event, Instant::now());
            }

            command = control_rx.recv(), if controls_open => {
                match command {
                    Some(command) => engine.handle(command, Instant::now()),
                    None => {
                        debug!("control channel closed");
                        controls_open = false;
                    }
                }
            }

            _ = sleep_until(deadline.into()) => {
                engine.on_tick(Instant::now());
            }
        }
    };

    engine.stop_and_return_to_background();
    info!(?outcome, "player loop finished");
    cancel.cancel();
    Ok(outcome)
}
