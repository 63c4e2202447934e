//! Track-level reads and writes.
//!
//! The host editor owns its tracks; it exposes them through [`TrackEvents`].
//! [`NoteTrack`] is the in-memory implementation used by the MIDI-file
//! project and by tests.

use crate::note::{Note, NotePayload, TickRange};
use crate::transform::{clamp_to_length, scale_and_shift};
use serde::{Deserialize, Serialize};

/// A note stored on a track, with the track's id for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackNote {
    pub id: u64,
    pub note: Note,
}

/// The slice of a host track this crate needs.
pub trait TrackEvents {
    /// All note events currently on the track.
    fn note_events(&self) -> Vec<TrackNote>;

    /// Append notes; the track assigns ids.
    fn add_notes(&mut self, notes: Vec<Note>);

    /// Remove notes by id. Unknown ids are ignored.
    fn remove_notes(&mut self, ids: &[u64]);
}

/// Options for writing a payload onto a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Destination timebase.
    pub target_timebase: u32,
    /// Rescale from the payload's timebase. Default: true.
    pub scale_to_target: bool,
}

impl WriteOptions {
    pub fn scaled(target_timebase: u32) -> Self {
        Self {
            target_timebase,
            scale_to_target: true,
        }
    }
}

/// Notes intersecting `[from, to)`, clipped to it and made relative to `from`.
pub fn extract_notes_in_range(events: &[TrackNote], from: u64, to: u64) -> Vec<Note> {
    events
        .iter()
        .filter_map(|ev| {
            let start = ev.note.tick.max(from);
            let end = ev.note.end().min(to);
            (end > start).then(|| Note {
                tick: start - from,
                duration: end - start,
                ..ev.note
            })
        })
        .collect()
}

/// Ids of notes whose span intersects `[from, to)`.
pub fn note_ids_intersecting(events: &[TrackNote], from: u64, to: u64) -> Vec<u64> {
    events
        .iter()
        .filter(|ev| ev.note.intersects(from, to))
        .map(|ev| ev.id)
        .collect()
}

/// Delete every note intersecting `[from, to)`. Returns how many went.
pub fn remove_notes_in_range<T: TrackEvents + ?Sized>(track: &mut T, from: u64, to: u64) -> usize {
    let ids = note_ids_intersecting(&track.note_events(), from, to);
    if !ids.is_empty() {
        track.remove_notes(&ids);
    }
    ids.len()
}

/// Add a payload at `base_tick` without touching existing notes.
pub fn write_notes_at<T: TrackEvents + ?Sized>(
    track: &mut T,
    payload: &NotePayload,
    base_tick: u64,
    opts: WriteOptions,
) -> usize {
    let placed = scale_and_shift(payload, base_tick, opts.target_timebase, opts.scale_to_target);
    let count = placed.notes.len();
    track.add_notes(placed.notes);
    count
}

/// Overwrite `range` on the track with `payload`.
///
/// Notes intersecting the range are deleted, then the payload is scaled,
/// cut to the range length and written at `range.from`. Content outside the
/// range is untouched and nothing is written outside it.
pub fn replace_in_range<T: TrackEvents + ?Sized>(
    track: &mut T,
    payload: &NotePayload,
    range: TickRange,
    opts: WriteOptions,
) -> ReplaceStats {
    let removed = remove_notes_in_range(track, range.from, range.to);
    let scaled = scale_and_shift(payload, 0, opts.target_timebase, opts.scale_to_target);
    let fitted = clamp_to_length(&scaled, range.len());
    let written = fitted.notes.len();
    let placed = scale_and_shift(&fitted, range.from, opts.target_timebase, false);
    track.add_notes(placed.notes);
    ReplaceStats { removed, written }
}

/// What [`replace_in_range`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplaceStats {
    pub removed: usize,
    pub written: usize,
}

/// In-memory track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTrack {
    pub name: String,
    pub channel: u8,
    next_id: u64,
    events: Vec<TrackNote>,
}

impl NoteTrack {
    pub fn new(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            next_id: 1,
            events: Vec::new(),
        }
    }

    pub fn with_notes(name: impl Into<String>, channel: u8, notes: Vec<Note>) -> Self {
        let mut track = Self::new(name, channel);
        track.add_notes(notes);
        track
    }

    /// Notes ordered by tick.
    pub fn notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.events.iter().map(|ev| ev.note).collect();
        notes.sort_by_key(|n| (n.tick, n.note_number));
        notes
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Exclusive end of the last note.
    pub fn end_tick(&self) -> u64 {
        self.events.iter().map(|ev| ev.note.end()).max().unwrap_or(0)
    }
}

impl TrackEvents for NoteTrack {
    fn note_events(&self) -> Vec<TrackNote> {
        self.events.clone()
    }

    fn add_notes(&mut self, notes: Vec<Note>) {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        for note in notes {
            self.events.push(TrackNote {
                id: self.next_id,
                note,
            });
            self.next_id += 1;
        }
    }

    fn remove_notes(&mut self, ids: &[u64]) {
        self.events.retain(|ev| !ids.contains(&ev.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spans(notes: &[Note]) -> Vec<(u64, u64)> {
        notes.iter().map(|n| (n.tick, n.duration)).collect()
    }

    #[test]
    fn test_extract_notes_in_range_is_relative() {
        let track = NoteTrack::with_notes(
            "src",
            0,
            vec![
                Note::new(1800, 240, 60, 90),
                Note::new(2000, 100, 62, 90),
                Note::new(3900, 100, 64, 90),
            ],
        );
        let notes = extract_notes_in_range(&track.note_events(), 1920, 3840);
        assert_eq!(spans(&notes), vec![(0, 120), (80, 100)]);
    }

    #[test]
    fn test_replace_in_range_overwrites_only_range() {
        let mut track = NoteTrack::with_notes(
            "dest",
            0,
            vec![
                Note::new(0, 480, 48, 90),
                Note::new(1800, 240, 50, 90),
                Note::new(2400, 100, 52, 90),
                Note::new(4000, 100, 53, 90),
            ],
        );
        let payload = NotePayload::new(480, vec![Note::new(0, 100, 72, 100), Note::new(1900, 200, 74, 100)]);

        let stats = replace_in_range(
            &mut track,
            &payload,
            TickRange { from: 1920, to: 3840 },
            WriteOptions::scaled(480),
        );

        assert_eq!(stats, ReplaceStats { removed: 2, written: 2 });
        let notes = track.notes();
        assert_eq!(
            spans(&notes),
            vec![(0, 480), (1920, 100), (3820, 20), (4000, 100)]
        );
    }

    #[test]
    fn test_write_notes_at_adds_without_removing() {
        let mut track = NoteTrack::with_notes("dest", 0, vec![Note::new(0, 10, 60, 90)]);
        let payload = NotePayload::new(480, vec![Note::new(0, 10, 61, 90)]);
        let written = write_notes_at(&mut track, &payload, 0, WriteOptions::scaled(960));
        assert_eq!(written, 1);
        assert_eq!(track.len(), 2);
        assert_eq!(track.end_tick(), 20);
    }

    #[test]
    fn test_remove_unknown_ids_is_ignored() {
        let mut track = NoteTrack::with_notes("t", 0, vec![Note::new(0, 10, 60, 90)]);
        track.remove_notes(&[99]);
        assert_eq!(track.len(), 1);
    }
}
