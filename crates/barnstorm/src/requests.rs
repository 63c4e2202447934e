//! Caller-facing generation requests and the checks run before any of them
//! reaches the network.

use crate::api::{Instrument, MidiFile, TaskKind};
use crate::error::{Error, Result};
use crate::project::Project;
use crate::segmentation::segmentation_for_bars;
use notespan::{extract_notes_in_range, notes_to_smf, try_select_bars, BarRange, TrackNote};
use stormconf::DefaultsConfig;

/// Generate from a chord progression alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChordsRequest {
    pub chords: Vec<String>,
    /// Beats per chord. Defaults to `beats_per_chord` for every chord.
    pub chord_beats: Option<Vec<u32>>,
    /// Bars of the destination selection. Defaults to one bar per chord.
    pub bars: Option<u32>,
    pub bpm: Option<f64>,
    pub n_midi: Option<u32>,
    /// Defaults to the configured instrument.
    pub instrument: Option<Instrument>,
}

/// Generate from chords plus a reference clip.
#[derive(Debug, Clone, PartialEq)]
pub struct RefMidiRequest {
    pub chords: Vec<String>,
    pub chord_beats: Option<Vec<u32>>,
    pub bars: Option<u32>,
    pub bpm: Option<f64>,
    pub ref_midi: MidiFile,
    pub instrument: Option<Instrument>,
}

/// Interpolate between two reference clips at several points.
#[derive(Debug, Clone, PartialEq)]
pub struct MixSetRequest {
    pub chords: Vec<String>,
    pub chord_beats: Option<Vec<u32>>,
    pub bars: Option<u32>,
    pub bpm: Option<f64>,
    /// Defaults to the configured `mix_alphas`.
    pub alphas: Option<Vec<f64>>,
    pub midi_a: MidiFile,
    pub midi_b: MidiFile,
    /// Bar count of the selection A was cut from. Measured from the file
    /// when absent.
    pub bars_a: Option<u32>,
    pub bars_b: Option<u32>,
}

/// Any of the three job kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    Chords(ChordsRequest),
    RefMidi(RefMidiRequest),
    MixSet(MixSetRequest),
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::Chords(_) => TaskKind::ChordsToMidis,
            TaskRequest::RefMidi(_) => TaskKind::RefMidiToMidi,
            TaskRequest::MixSet(_) => TaskKind::RefMidisMixSet,
        }
    }
}

/// Fields every request kind shares, normalized and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFields {
    pub chords: Vec<String>,
    pub chord_beats: Vec<u32>,
    pub bars: u32,
    pub segmentation: String,
    pub bpm: String,
}

impl PreparedFields {
    pub fn prepare(
        chords: &[String],
        chord_beats: Option<&[u32]>,
        bars: Option<u32>,
        bpm: Option<f64>,
        defaults: &DefaultsConfig,
    ) -> Result<Self> {
        let chords: Vec<String> = chords.iter().map(|c| c.trim().to_string()).collect();
        let bars = bars.unwrap_or(chords.len() as u32);
        validate_chords(&chords, bars)?;

        let chord_beats = match chord_beats {
            Some(beats) if beats.len() != chords.len() => {
                return Err(Error::precondition(format!(
                    "got {} chord beat values for {} chords",
                    beats.len(),
                    chords.len()
                )));
            }
            Some(beats) => beats.to_vec(),
            None => vec![defaults.beats_per_chord; chords.len()],
        };

        let bpm = bpm.unwrap_or(defaults.bpm);
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(Error::precondition(format!("invalid tempo {bpm}")));
        }

        Ok(Self {
            segmentation: segmentation_for_bars(bars),
            bpm: format_bpm(bpm),
            chords,
            chord_beats,
            bars,
        })
    }
}

/// Tempo as sent on the wire: two decimals.
pub fn format_bpm(bpm: f64) -> String {
    format!("{bpm:.2}")
}

/// A selection must exist before anything bar-based can be sent.
pub fn validate_selection(selection: Option<&BarRange>) -> Result<&BarRange> {
    selection.ok_or_else(|| Error::precondition("select a bar range first"))
}

/// One non-blank chord per selected bar.
pub fn validate_chords(chords: &[String], bars: u32) -> Result<()> {
    if bars == 0 {
        return Err(Error::precondition("selected bar count is invalid"));
    }
    if chords.len() != bars as usize {
        return Err(Error::precondition(format!(
            "chord count ({}) does not match selected bar count ({})",
            chords.len(),
            bars
        )));
    }
    if let Some(empty_at) = chords.iter().position(|c| c.trim().is_empty()) {
        return Err(Error::precondition(format!(
            "chord for bar {} is empty",
            empty_at + 1
        )));
    }
    Ok(())
}

/// Split a chord string like `"Am F | C G"` into chords.
pub fn parse_chord_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Package the notes of a selection as a single-track reference MIDI file.
pub fn selection_to_midi(
    events: &[TrackNote],
    selection: &BarRange,
    timebase: u32,
    filename: &str,
) -> Result<MidiFile> {
    let notes = extract_notes_in_range(events, selection.from_tick, selection.to_tick);
    if notes.is_empty() {
        return Err(Error::precondition("the selection contains no notes"));
    }
    let bytes = notes_to_smf(&notes, timebase, "piano")?;
    Ok(MidiFile::new(filename, bytes))
}

/// Cut the bars touched by `tick_a..=tick_b` out of a project track as a
/// standalone clip. Returns the clip and the selection it covers.
pub fn clip_from_project<P: Project + ?Sized>(
    project: &mut P,
    track_index: usize,
    tick_a: u64,
    tick_b: u64,
    filename: &str,
) -> Result<(MidiFile, BarRange)> {
    let selection = try_select_bars(project.meter(), tick_a, tick_b)?;
    let timebase = project.timebase();
    let track = project
        .track_mut(track_index)
        .ok_or_else(|| Error::precondition(format!("project has no track {track_index}")))?;
    let file = selection_to_midi(&track.note_events(), &selection, timebase, filename)?;
    Ok((file, selection))
}

/// A and B of a mix sweep must cover the same number of bars.
pub fn check_mix_bars(bars_a: u32, bars_b: u32) -> Result<()> {
    if bars_a != bars_b {
        return Err(Error::precondition(format!(
            "A and B need the same bar count (A={bars_a}, B={bars_b})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::MidiProject;
    use notespan::{select_bars, Meter, Note, NoteTrack, TrackEvents};
    use pretty_assertions::assert_eq;

    fn chords(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prepare_fills_defaults() {
        let fields = PreparedFields::prepare(
            &chords(&[" Am", "F ", "C", "G"]),
            None,
            Some(4),
            Some(120.0),
            &DefaultsConfig::default(),
        )
        .unwrap();
        assert_eq!(fields.chords, chords(&["Am", "F", "C", "G"]));
        assert_eq!(fields.chord_beats, vec![4, 4, 4, 4]);
        assert_eq!(fields.segmentation, "A4");
        assert_eq!(fields.bpm, "120.00");
    }

    #[test]
    fn test_prepare_bars_default_to_chord_count() {
        let fields = PreparedFields::prepare(
            &chords(&["C", "C", "F", "F", "G"]),
            None,
            None,
            Some(98.5),
            &DefaultsConfig::default(),
        )
        .unwrap();
        assert_eq!(fields.bars, 5);
        assert_eq!(fields.segmentation, "A4B1");
        assert_eq!(fields.bpm, "98.50");
    }

    #[test]
    fn test_prepare_rejects_beat_count_mismatch() {
        let err = PreparedFields::prepare(
            &chords(&["C", "G"]),
            Some(&[4]),
            None,
            None,
            &DefaultsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_validate_chords_messages() {
        assert!(validate_chords(&chords(&["C"]), 0).is_err());
        let err = validate_chords(&chords(&["C", "G"]), 3).unwrap_err();
        assert!(err.to_string().contains("(2)"));
        let err = validate_chords(&chords(&["C", " ", "G"]), 3).unwrap_err();
        assert_eq!(err.to_string(), "chord for bar 2 is empty");
        assert!(validate_chords(&chords(&["C", "G"]), 2).is_ok());
    }

    #[test]
    fn test_validate_selection() {
        assert!(validate_selection(None).is_err());
        let meter = Meter::four_four(480).unwrap();
        let range = select_bars(&meter, 0, 0);
        assert_eq!(validate_selection(Some(&range)).unwrap().bars, 1);
    }

    #[test]
    fn test_parse_chord_list() {
        assert_eq!(parse_chord_list("Am F | C,G7  "), chords(&["Am", "F", "C", "G7"]));
    }

    #[test]
    fn test_selection_to_midi_requires_notes() {
        let meter = Meter::four_four(480).unwrap();
        let track = NoteTrack::with_notes("lead", 0, vec![Note::new(100, 200, 60, 90)]);

        let first_bar = select_bars(&meter, 0, 0);
        let file = selection_to_midi(&track.note_events(), &first_bar, 480, "ref_selection.mid").unwrap();
        assert_eq!(file.filename, "ref_selection.mid");
        let parsed = notespan::parse_first_track(&file.bytes).unwrap();
        assert_eq!(parsed.payload.notes.len(), 1);
        assert_eq!(parsed.payload.notes[0].tick, 100);

        let second_bar = select_bars(&meter, 1920, 1920);
        assert!(selection_to_midi(&track.note_events(), &second_bar, 480, "x.mid").is_err());
    }

    #[test]
    fn test_clip_from_project_takes_selected_bars() {
        let mut project = MidiProject::new(480).unwrap();
        project.insert_track(
            NoteTrack::with_notes(
                "lead",
                0,
                vec![Note::new(100, 200, 60, 90), Note::new(2000, 400, 62, 90), Note::new(6000, 100, 64, 90)],
            ),
            0,
        );

        let (file, selection) = clip_from_project(&mut project, 0, 1920, 4000, "a.mid").unwrap();
        assert_eq!(selection.bars, 2);
        assert_eq!(selection.from_tick, 1920);
        assert_eq!(file.filename, "a.mid");
        let parsed = notespan::parse_first_track(&file.bytes).unwrap();
        let ticks: Vec<u64> = parsed.payload.notes.iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![80]);
    }

    #[test]
    fn test_clip_from_project_rejects_bad_input() {
        let mut project = MidiProject::new(480).unwrap();
        project.insert_track(NoteTrack::with_notes("lead", 0, vec![Note::new(0, 100, 60, 90)]), 0);

        let err = clip_from_project(&mut project, 3, 0, 0, "a.mid").unwrap_err();
        assert_eq!(err.to_string(), "project has no track 3");

        let err = clip_from_project(&mut project, 0, 0, u64::MAX - 10, "a.mid").unwrap_err();
        assert!(matches!(err, Error::Midi(notespan::Error::SelectionTooLong { .. })));
    }

    #[test]
    fn test_check_mix_bars() {
        assert!(check_mix_bars(4, 4).is_ok());
        let err = check_mix_bars(2, 4).unwrap_err();
        assert_eq!(err.to_string(), "A and B need the same bar count (A=2, B=4)");
    }
}
