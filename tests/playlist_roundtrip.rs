use std::path::PathBuf;

use kiosk_player::playlist::Playlist;

#[test]
fn sample_playlist_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playlist.csv");
    let written = Playlist::write_sample(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("1,test/4.jpg,5,08:00:00,08:00:05,"));
    assert!(text.contains("4,test/1.mp4,60,08:00:40,08:01:40,"));

    let loaded = Playlist::load(&path);
    assert_eq!(loaded, written);
    let summary: Vec<(PathBuf, u64)> = loaded
        .entries()
        .iter()
        .map(|e| (e.path.clone(), e.duration_secs))
        .collect();
    assert_eq!(
        summary,
        [
            (PathBuf::from("test/4.jpg"), 5),
            (PathBuf::from("test/3.jpg"), 5),
            (PathBuf::from("test/2.jpg"), 30),
            (PathBuf::from("test/1.mp4"), 60),
            (PathBuf::from("repeat"), 0),
        ]
    );
    assert!(loaded.get(4).unwrap().is_repeat_marker());
}

#[test]
fn missing_or_useless_source_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        Playlist::load(&dir.path().join("absent.csv")),
        Playlist::fallback()
    );

    let junk = dir.path().join("junk.csv");
    std::fs::write(&junk, "\n1,a.jpg\nx,b.jpg,soon\n").unwrap();
    assert_eq!(Playlist::load(&junk), Playlist::fallback());

    // A directory exists but cannot be read as text.
    assert_eq!(Playlist::load(dir.path()), Playlist::fallback());
}

#[test]
fn legacy_records_get_default_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.csv");
    std::fs::write(&path, "1, media/a.jpg , 7\n2,media/b.mp4,0\n").unwrap();
    let loaded = Playlist::load(&path);
    assert_eq!(loaded.len(), 2);
    let first = loaded.get(0).unwrap();
    assert_eq!(first.path, PathBuf::from("media/a.jpg"));
    assert_eq!(first.duration_secs, 7);
    assert_eq!(first.scheduled_start, "00:00:00");
    assert_eq!(first.scheduled_end, "00:00:00");
}
