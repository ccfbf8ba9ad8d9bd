mod common;

use std::time::Duration;

use common::{FakeFactory, Fixture, Harness, RecordingPresentation, Shown};
use kiosk_player::engine::EngineOptions;
use kiosk_player::events::{BackendEvent, PlayerCommand, Shutdown, TaggedEvent};
use kiosk_player::playlist::Playlist;
use kiosk_player::tasks::player;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_file_run_completes_and_cancels_siblings() {
    let fx = Fixture::new(&[("only.jpg", 0)]);
    let options = EngineOptions {
        single_file: true,
        ..EngineOptions::default()
    };
    let h = Harness::build(
        Playlist::single(fx.path("only.jpg"), 0),
        FakeFactory::default(),
        RecordingPresentation::default(),
        options,
    );
    let (control_tx, control_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    control_tx.send(PlayerCommand::Start).await.unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        player::run(h.engine, h.events, control_rx, cancel.clone()),
    )
    .await
    .expect("player loop should finish")
    .unwrap();
    assert_eq!(outcome, Shutdown::Completed);
    assert!(cancel.is_cancelled());
    assert!(
        h.shown
            .lock()
            .unwrap()
            .contains(&Shown::Image(fx.path("only.jpg")))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_command_stops_playback() {
    let fx = Fixture::new(&[("a.jpg", 30), ("b.jpg", 30)]);
    let h = Harness::new(fx.playlist.clone());
    let shown = h.shown.clone();
    let (control_tx, control_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(player::run(h.engine, h.events, control_rx, cancel.clone()));
    control_tx.send(PlayerCommand::Start).await.unwrap();
    control_tx.send(PlayerCommand::Next).await.unwrap();
    control_tx.send(PlayerCommand::Quit).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("player loop should finish")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Shutdown::Completed);
    let shown = shown.lock().unwrap();
    assert!(shown.contains(&Shown::Image(fx.path("b.jpg"))));
    assert_eq!(shown.last(), Some(&Shown::Background));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_events_reach_the_engine() {
    let fx = Fixture::new(&[("clip.mp4", 0)]);
    let options = EngineOptions {
        single_file: true,
        ..EngineOptions::default()
    };
    let mut h = Harness::build(
        fx.playlist.clone(),
        FakeFactory::default(),
        RecordingPresentation::default(),
        options,
    );
    h.engine.start(std::time::Instant::now());
    let ticket = h.engine.active_ticket().unwrap();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    events_tx
        .send(TaggedEvent {
            ticket,
            event: BackendEvent::EndOfMedia,
        })
        .unwrap();
    let (_control_tx, control_rx) = mpsc::channel(4);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        player::run(h.engine, events_rx, control_rx, CancellationToken::new()),
    )
    .await
    .expect("player loop should finish")
    .unwrap();
    assert_eq!(outcome, Shutdown::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_ends_the_loop() {
    let fx = Fixture::new(&[("a.jpg", 30)]);
    let h = Harness::new(fx.playlist.clone());
    let (_control_tx, control_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(player::run(h.engine, h.events, control_rx, cancel.clone()));

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("player loop should finish")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Shutdown::Completed);
}
