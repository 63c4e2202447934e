//! Bar-aligned tick math and note-range transforms.
//!
//! Everything here is synchronous and pure except the [`track`] writers,
//! which mutate a caller-supplied [`TrackEvents`] implementation.

pub mod bar_range;
pub mod meter;
pub mod midi_file;
pub mod note;
pub mod track;
pub mod transform;

pub use bar_range::{
    bar_range_from_one_tick, bar_range_from_two_ticks, bars_from_end_tick,
    compute_selection_info, select_bars, try_select_bars, BarRange, MAX_SELECTION_BARS,
};
pub use meter::{Beat, Measure, Meter};
pub use midi_file::{notes_to_smf, parse_first_track, parse_song, song_to_smf, ParsedMidi, SmfSong, SmfTrack};
pub use note::{Note, NotePayload, TickRange};
pub use track::{
    extract_notes_in_range, note_ids_intersecting, remove_notes_in_range, replace_in_range,
    write_notes_at, NoteTrack, ReplaceStats, TrackEvents, TrackNote, WriteOptions,
};
pub use transform::{
    clamp_to_length, estimate_bars, normalize_bar_start_to_zero, reconcile_length, rescale,
    scale_and_shift, tile_to_length, Reconciliation,
};

/// Errors from MIDI and meter operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("MIDI write error: {0}")]
    MidiWrite(String),

    #[error("MIDI file has no usable tracks")]
    NoTracks,

    #[error("invalid meter: {0}")]
    InvalidMeter(String),

    #[error("selection spans {bars} bars (at most {max} allowed)")]
    SelectionTooLong { bars: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
