//! Standard MIDI File reading and writing via `midly`.

use crate::bar_range::bars_from_end_tick;
use crate::meter::Meter;
use crate::note::{Note, NotePayload};
use crate::{Error, Result};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default tempo when a file carries none (120 BPM).
pub const DEFAULT_TEMPO_USEC: u32 = 500_000;

/// One track of a parsed or to-be-written song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmfTrack {
    pub name: String,
    pub channel: u8,
    pub notes: Vec<Note>,
}

/// A whole song: timing, meter and note tracks.
///
/// The conductor track (tempo and time signatures) is not listed in
/// `tracks`; it is rebuilt from `meter` and `tempo_changes` when writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmfSong {
    pub timebase: u32,
    pub meter: Meter,
    /// `(tick, microseconds per quarter)`
    pub tempo_changes: Vec<(u64, u32)>,
    pub tracks: Vec<SmfTrack>,
}

impl SmfSong {
    /// BPM of the first tempo event (120 when none).
    pub fn initial_bpm(&self) -> f64 {
        let usec = self
            .tempo_changes
            .first()
            .map(|(_, usec)| *usec)
            .unwrap_or(DEFAULT_TEMPO_USEC);
        60_000_000.0 / usec.max(1) as f64
    }
}

/// The note track picked out of a file for import or upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMidi {
    pub track_name: String,
    /// Bars covered by the notes, measured with the file's own meter.
    pub bars: u32,
    pub payload: NotePayload,
    pub meter: Meter,
}

struct RawTrack {
    name: Option<String>,
    channel: Option<u8>,
    notes: Vec<Note>,
    is_conductor: bool,
}

fn timebase_of(smf: &Smf) -> u32 {
    match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int() as u32,
        Timing::Timecode(_, _) => 480,
    }
}

/// Pair note-on/note-off events of one track into notes.
fn read_track(track: &Track) -> (RawTrack, Vec<(u64, u8, u8)>, Vec<(u64, u32)>) {
    let mut current_tick: u64 = 0;
    let mut name = None;
    let mut first_channel = None;
    let mut notes = Vec::new();
    let mut has_tempo_map = false;
    let mut time_signatures = Vec::new();
    let mut tempo_changes = Vec::new();
    // (channel, key) -> stack of (onset, velocity)
    let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

    for event in track {
        current_tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                name = String::from_utf8(bytes.to_vec()).ok();
            }
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                has_tempo_map = true;
                tempo_changes.push((current_tick, tempo.as_int()));
            }
            TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, _, _)) => {
                has_tempo_map = true;
                time_signatures.push((current_tick, num, 1u8 << denom_pow.min(7)));
            }
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        first_channel.get_or_insert(ch);
                        pending
                            .entry((ch, key.as_int()))
                            .or_default()
                            .push((current_tick, vel.as_int()));
                    }
                    MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                        if let Some((onset, velocity)) =
                            pending.get_mut(&(ch, key.as_int())).and_then(|s| s.pop())
                        {
                            notes.push(Note {
                                tick: onset,
                                duration: (current_tick - onset).max(1),
                                velocity,
                                note_number: key.as_int(),
                                channel: ch,
                            });
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // Close hanging notes at the end of the track
    for ((ch, key), stack) in pending {
        for (onset, velocity) in stack {
            notes.push(Note {
                tick: onset,
                duration: current_tick.saturating_sub(onset).max(1),
                velocity,
                note_number: key,
                channel: ch,
            });
        }
    }
    notes.sort_by_key(|n| (n.tick, n.note_number));

    let is_conductor = notes.is_empty() && has_tempo_map;
    (
        RawTrack {
            name,
            channel: first_channel,
            notes,
            is_conductor,
        },
        time_signatures,
        tempo_changes,
    )
}

/// Parse every track of a file.
pub fn parse_song(bytes: &[u8]) -> Result<SmfSong> {
    let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
    let timebase = timebase_of(&smf);

    let mut time_signatures = Vec::new();
    let mut tempo_changes = Vec::new();
    let mut tracks = Vec::new();

    for (index, track) in smf.tracks.iter().enumerate() {
        let (raw, sigs, tempos) = read_track(track);
        time_signatures.extend(sigs);
        tempo_changes.extend(tempos);
        if raw.is_conductor {
            continue;
        }
        tracks.push(SmfTrack {
            name: raw.name.unwrap_or_else(|| format!("Track {}", index)),
            channel: raw.channel.unwrap_or(0),
            notes: raw.notes,
        });
    }

    tempo_changes.sort_by_key(|(tick, _)| *tick);
    let meter = Meter::from_time_signatures(timebase, &time_signatures)?;

    Ok(SmfSong {
        timebase,
        meter,
        tempo_changes,
        tracks,
    })
}

/// Parse a file and keep only its first note-bearing track.
///
/// A leading conductor track is skipped; if no track has notes the first
/// non-conductor track is used (and yields an empty payload).
pub fn parse_first_track(bytes: &[u8]) -> Result<ParsedMidi> {
    let song = parse_song(bytes)?;
    let SmfSong {
        timebase,
        meter,
        tracks,
        ..
    } = song;

    let index = tracks
        .iter()
        .position(|t| !t.notes.is_empty())
        .or(if tracks.is_empty() { None } else { Some(0) })
        .ok_or(Error::NoTracks)?;
    let track = tracks.into_iter().nth(index).ok_or(Error::NoTracks)?;

    let payload = NotePayload::new(timebase, track.notes);
    let bars = bars_from_end_tick(&meter, payload.max_end());

    Ok(ParsedMidi {
        track_name: track.name,
        bars,
        payload,
        meter,
    })
}

fn delta(from: u64, to: u64) -> Result<u28> {
    let d = to - from;
    if d > 0x0FFF_FFFF {
        return Err(Error::MidiWrite(format!("delta {} exceeds 28 bits", d)));
    }
    Ok(u28::new(d as u32))
}

fn header(timebase: u32, format: Format) -> Result<Header> {
    if timebase == 0 || timebase > 0x7FFF {
        return Err(Error::MidiWrite(format!("timebase {} out of range", timebase)));
    }
    Ok(Header::new(format, Timing::Metrical(u15::new(timebase as u16))))
}

/// Absolute-tick events sorted and converted to deltas, ending with EndOfTrack.
fn finish_track<'a>(mut events: Vec<(u64, u8, TrackEventKind<'a>)>) -> Result<Track<'a>> {
    // note-offs (order 0) go before note-ons (order 1) on the same tick
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last = 0u64;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: delta(last, tick)?,
            kind,
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track)
}

fn note_events<'a>(notes: &[Note], channel: u8) -> Vec<(u64, u8, TrackEventKind<'a>)> {
    let channel = u4::new(channel & 0x0F);
    let mut events = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let key = u7::new(note.note_number.min(127));
        events.push((
            note.tick,
            1,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::new(note.velocity.clamp(1, 127)),
                },
            },
        ));
        events.push((
            note.end(),
            0,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            },
        ));
    }
    events
}

fn write_smf(smf: &Smf) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| Error::MidiWrite(e.to_string()))?;
    Ok(buf)
}

/// Write notes as a single-track file (format 0) at 120 BPM in 4/4.
pub fn notes_to_smf(notes: &[Note], timebase: u32, track_name: &str) -> Result<Vec<u8>> {
    let mut events = vec![
        (0, 0, TrackEventKind::Meta(MetaMessage::TrackName(track_name.as_bytes()))),
        (
            0,
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(DEFAULT_TEMPO_USEC))),
        ),
        (0, 0, TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))),
    ];
    let channel = notes.first().map(|n| n.channel).unwrap_or(0);
    events.extend(note_events(notes, channel));

    let mut smf = Smf::new(header(timebase, Format::SingleTrack)?);
    smf.tracks.push(finish_track(events)?);
    write_smf(&smf)
}

/// Write a whole song as a format-1 file: conductor track plus one track
/// per [`SmfTrack`].
pub fn song_to_smf(song: &SmfSong) -> Result<Vec<u8>> {
    let mut conductor = Vec::new();
    for &(tick, usec) in &song.tempo_changes {
        conductor.push((
            tick,
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(usec.min(0x00FF_FFFF)))),
        ));
    }
    if song.tempo_changes.is_empty() {
        conductor.push((
            0,
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(DEFAULT_TEMPO_USEC))),
        ));
    }
    for m in song.meter.measures() {
        let denom_pow = m.denominator.max(1).trailing_zeros() as u8;
        conductor.push((
            m.start_tick,
            0,
            TrackEventKind::Meta(MetaMessage::TimeSignature(m.numerator, denom_pow, 24, 8)),
        ));
    }

    let mut smf = Smf::new(header(song.timebase, Format::Parallel)?);
    smf.tracks.push(finish_track(conductor)?);

    for track in &song.tracks {
        let mut events = vec![(
            0,
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        )];
        events.extend(note_events(&track.notes, track.channel));
        smf.tracks.push(finish_track(events)?);
    }

    write_smf(&smf)
}
