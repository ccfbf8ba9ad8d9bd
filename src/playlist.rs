//! Playlist source parsing and index arithmetic.
//!
//! A playlist is a CSV-ish text file, one record per line:
//! `index,path,duration[,start,end[,...]]`. The leading index is kept for
//! readability only; file order is playback order.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveTime, TimeDelta};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::error::PlaylistError;

/// Control marker that wraps the playhead back to the first entry.
pub const REPEAT_MARKER: &str = "repeat";

const DEFAULT_SCHEDULE_TIME: &str = "00:00:00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub path: PathBuf,
    pub duration_secs: u64,
    pub scheduled_start: String,
    pub scheduled_end: String,
}

impl PlaylistEntry {
    pub fn new(path: impl Into<PathBuf>, duration_secs: u64) -> Self {
        Self {
            path: path.into(),
            duration_secs,
            scheduled_start: DEFAULT_SCHEDULE_TIME.to_string(),
            scheduled_end: DEFAULT_SCHEDULE_TIME.to_string(),
        }
    }

    pub fn is_repeat_marker(&self) -> bool {
        self.path
            .to_str()
            .is_some_and(|p| p.eq_ignore_ascii_case(REPEAT_MARKER))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn from_entries(entries: Vec<PlaylistEntry>) -> Self {
        Self { entries }
    }

    /// The playlist used whenever the configured source is missing or empty.
    pub fn fallback() -> Self {
        Self::from_entries(vec![
            PlaylistEntry::new("test_image.jpg", 3),
            PlaylistEntry::new("test_video.mp4", 10),
        ])
    }

    /// A playlist holding exactly one ad-hoc file.
    pub fn single(path: impl Into<PathBuf>, duration_secs: u64) -> Self {
        Self::from_entries(vec![PlaylistEntry::new(path, duration_secs)])
    }

    /// Load a playlist, degrading to [`Playlist::fallback`] instead of failing.
    pub fn load(source: &Path) -> Self {
        match Self::read(source) {
            Ok(Some(playlist)) if !playlist.is_empty() => {
                info!(
                    source = %source.display(),
                    entries = playlist.len(),
                    "playlist loaded"
                );
                playlist
            }
            Ok(Some(_)) => {
                warn!(source = %source.display(), "playlist has no valid entries; using fallback");
                Self::fallback()
            }
            Ok(None) => {
                warn!(source = %source.display(), "playlist not found; using fallback");
                Self::fallback()
            }
            Err(err) => {
                warn!("{err}; using fallback playlist");
                Self::fallback()
            }
        }
    }

    /// Read a playlist file. `Ok(None)` means the file does not exist.
    pub fn read(source: &Path) -> Result<Option<Self>, PlaylistError> {
        match fs::read_to_string(source) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source_err) => Err(PlaylistError::Io {
                path: source.to_path_buf(),
                source: source_err,
            }),
        }
    }

    /// Parse playlist text, skipping records that cannot be understood.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_record(idx + 1, line) {
                Ok(entry) => entries.push(entry),
                Err(err) => debug!("skipping playlist record: {err}"),
            }
        }
        Self { entries }
    }

    /// Render the playlist in the extended record shape.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "{},{},{},{},{},",
                idx + 1,
                entry.path.display(),
                entry.duration_secs,
                entry.scheduled_start,
                entry.scheduled_end
            );
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv())
            .with_context(|| format!("failed to write playlist {}", path.display()))
    }

    /// The playlist written on first start so operators have something to edit.
    pub fn sample() -> Self {
        let samples: [(&str, u64); 5] = [
            ("test/4.jpg", 5),
            ("test/3.jpg", 5),
            ("test/2.jpg", 30),
            ("test/1.mp4", 60),
            (REPEAT_MARKER, 0),
        ];
        let mut clock = NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default();
        let mut entries = Vec::with_capacity(samples.len());
        for (path, duration_secs) in samples {
            let end = clock + TimeDelta::seconds(duration_secs as i64);
            entries.push(PlaylistEntry {
                path: PathBuf::from(path),
                duration_secs,
                scheduled_start: clock.format("%H:%M:%S").to_string(),
                scheduled_end: end.format("%H:%M:%S").to_string(),
            });
            clock = end;
        }
        Self { entries }
    }

    pub fn write_sample(path: &Path) -> Result<Self> {
        let sample = Self::sample();
        sample.write(path)?;
        info!(path = %path.display(), "sample playlist created");
        Ok(sample)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Next index with wrap-around; markers are not skipped here.
    pub fn wrap_next(&self, index: usize) -> usize {
        if self.entries.is_empty() || index + 1 >= self.entries.len() {
            0
        } else {
            index + 1
        }
    }

    /// Resolve `index` to something renderable: a marker sends the playhead
    /// to the start, and a leading run of markers is skipped. `None` when the
    /// playlist contains nothing but markers.
    pub fn resolve_playable(&self, index: usize) -> Option<usize> {
        let entry = self.entries.get(index)?;
        if !entry.is_repeat_marker() {
            return Some(index);
        }
        self.entries.iter().position(|e| !e.is_repeat_marker())
    }

    /// Manual forward step. Never wraps: `None` when no real entry follows.
    pub fn step_forward(&self, index: usize) -> Option<usize> {
        let len = self.entries.len();
        let mut candidate = index;
        for _ in 0..len {
            candidate += 1;
            if candidate >= len {
                return None;
            }
            if !self.entries[candidate].is_repeat_marker() {
                return Some(candidate);
            }
        }
        None
    }

    /// Manual backward step with wrap to the last entry, bounded by `len`
    /// steps. Returns `index` unchanged when every other entry is a marker.
    pub fn step_back(&self, index: usize) -> usize {
        let len = self.entries.len();
        if len == 0 {
            return 0;
        }
        let mut candidate = index.min(len - 1);
        for _ in 0..len {
            candidate = if candidate == 0 { len - 1 } else { candidate - 1 };
            if !self.entries[candidate].is_repeat_marker() {
                return candidate;
            }
        }
        index.min(len - 1)
    }

    /// Override the duration of the entry playing `path`, or insert a new
    /// entry right after `after`. Returns the entry's index.
    pub fn upsert(&mut self, path: &Path, duration_secs: u64, after: usize) -> usize {
        if let Some(idx) = self.position(path) {
            self.entries[idx].duration_secs = duration_secs;
            return idx;
        }
        let at = if self.entries.is_empty() {
            0
        } else {
            (after + 1).min(self.entries.len())
        };
        self.entries.insert(at, PlaylistEntry::new(path, duration_secs));
        at
    }

    /// Shuffle playable entries. Repeat markers move to the tail so the
    /// shuffled cycle still wraps.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let (mut playable, markers): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| !e.is_repeat_marker());
        playable.shuffle(rng);
        playable.extend(markers);
        self.entries = playable;
    }
}

fn parse_record(line_no: usize, line: &str) -> Result<PlaylistEntry, PlaylistError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(PlaylistError::Parse {
            line: line_no,
            reason: format!("expected at least 3 fields, found {}", fields.len()),
        });
    }
    let path = fields[1];
    if path.is_empty() {
        return Err(PlaylistError::Parse {
            line: line_no,
            reason: "empty path".to_string(),
        });
    }
    let duration_secs = fields[2].parse::<u64>().map_err(|err| PlaylistError::Parse {
        line: line_no,
        reason: format!("invalid duration {:?}: {err}", fields[2]),
    })?;
    let (scheduled_start, scheduled_end) = if fields.len() >= 5 {
        (fields[3].to_string(), fields[4].to_string())
    } else {
        (
            DEFAULT_SCHEDULE_TIME.to_string(),
            DEFAULT_SCHEDULE_TIME.to_string(),
        )
    };
    Ok(PlaylistEntry {
        path: PathBuf::from(path),
        duration_secs,
        scheduled_start,
        scheduled_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn paths(p: &Playlist) -> Vec<String> {
        p.entries()
            .iter()
            .map(|e| e.path.display().to_string())
            .collect()
    }

    #[test]
    fn parses_legacy_and_extended_records() {
        let p = Playlist::parse(
            "1,a.jpg,5\n\n2,b.mp4,60,08:00:32,08:01:32,\n3,c.png,7,09:00:00,09:00:07,extra,fields\n",
        );
        assert_eq!(paths(&p), ["a.jpg", "b.mp4", "c.png"]);
        assert_eq!(p.get(0).unwrap().scheduled_start, "00:00:00");
        assert_eq!(p.get(1).unwrap().scheduled_start, "08:00:32");
        assert_eq!(p.get(1).unwrap().scheduled_end, "08:01:32");
        assert_eq!(p.get(2).unwrap().duration_secs, 7);
    }

    #[test]
    fn skips_malformed_lines() {
        let p = Playlist::parse("1,a.jpg\n2,b.jpg,ten\n3,c.jpg,-4\n4,,5\n5,d.jpg,4\n");
        assert_eq!(paths(&p), ["d.jpg"]);
    }

    #[test]
    fn four_fields_read_as_legacy() {
        let p = Playlist::parse("1,a.jpg,5,08:00:00\n");
        assert_eq!(p.len(), 1);
        assert_eq!(p.get(0).unwrap().scheduled_end, "00:00:00");
    }

    #[test]
    fn repeat_marker_is_case_insensitive() {
        assert!(PlaylistEntry::new("REPEAT", 0).is_repeat_marker());
        assert!(PlaylistEntry::new("Repeat", 0).is_repeat_marker());
        assert!(!PlaylistEntry::new("repeat.jpg", 0).is_repeat_marker());
    }

    #[test]
    fn step_forward_stops_at_last_real_entry() {
        let p = Playlist::parse("1,a.jpg,1\n2,repeat,0\n3,b.jpg,1\n4,repeat,0\n");
        assert_eq!(p.step_forward(0), Some(2));
        assert_eq!(p.step_forward(2), None);
        assert_eq!(p.step_forward(3), None);
    }

    #[test]
    fn step_back_wraps_and_skips_markers() {
        let p = Playlist::parse("1,a.jpg,1\n2,b.jpg,1\n3,repeat,0\n");
        assert_eq!(p.step_back(1), 0);
        assert_eq!(p.step_back(0), 1);
    }

    #[test]
    fn all_marker_playlist_terminates() {
        let p = Playlist::parse("1,repeat,0\n2,REPEAT,0\n3,repeat,0\n");
        assert_eq!(p.step_forward(0), None);
        assert_eq!(p.step_back(1), 1);
        assert_eq!(p.resolve_playable(2), None);
    }

    #[test]
    fn resolve_playable_wraps_marker_to_start() {
        let p = Playlist::parse("1,a.jpg,1\n2,b.jpg,1\n3,repeat,0\n");
        assert_eq!(p.resolve_playable(2), Some(0));
        assert_eq!(p.resolve_playable(1), Some(1));
        assert_eq!(p.resolve_playable(9), None);
    }

    #[test]
    fn upsert_overrides_match_or_inserts_after_anchor() {
        let mut p = Playlist::parse("1,a.jpg,1\n2,b.mp4,1\n3,c.jpg,1\n");
        assert_eq!(p.upsert(Path::new("b.mp4"), 20, 0), 1);
        assert_eq!(p.get(1).unwrap().duration_secs, 20);
        assert_eq!(p.len(), 3);

        assert_eq!(p.upsert(Path::new("new.mp4"), 9, 1), 2);
        assert_eq!(paths(&p), ["a.jpg", "b.mp4", "new.mp4", "c.jpg"]);
    }

    #[test]
    fn shuffle_keeps_markers_at_tail() {
        let mut p = Playlist::parse("1,a.jpg,1\n2,repeat,0\n3,b.jpg,1\n4,c.jpg,1\n5,d.jpg,1\n");
        let mut rng = StdRng::seed_from_u64(7);
        p.shuffle(&mut rng);
        assert_eq!(p.len(), 5);
        assert!(p.get(4).unwrap().is_repeat_marker());
        let mut real = paths(&p)[..4].to_vec();
        real.sort();
        assert_eq!(real, ["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
    }

    #[test]
    fn sample_schedule_is_cumulative() {
        let sample = Playlist::sample();
        assert_eq!(sample.get(0).unwrap().scheduled_start, "08:00:00");
        assert_eq!(sample.get(0).unwrap().scheduled_end, "08:00:05");
        assert_eq!(sample.get(3).unwrap().scheduled_start, "08:00:40");
        assert_eq!(sample.get(3).unwrap().scheduled_end, "08:01:40");
        assert!(sample.get(4).unwrap().is_repeat_marker());
    }
}
