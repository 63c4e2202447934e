//! The editor-side project the import pipeline writes into.

use crate::error::Result;
use notespan::{parse_song, song_to_smf, Meter, NoteTrack, SmfSong, SmfTrack, TrackEvents};

/// What the import pipeline needs from the host project.
pub trait Project {
    fn meter(&self) -> &Meter;

    fn timebase(&self) -> u32 {
        self.meter().timebase()
    }

    fn track_count(&self) -> usize;

    fn track_mut(&mut self, index: usize) -> Option<&mut dyn TrackEvents>;

    fn insert_track(&mut self, track: NoteTrack, index: usize);

    /// Recompute the song end after notes changed.
    fn update_end_of_song(&mut self);

    /// Record an undo checkpoint. Called before every destructive write.
    fn push_history(&mut self);

    /// Move playhead and viewport.
    fn jump_to_tick(&mut self, tick: u64);
}

/// A [`Project`] held in memory and loaded from / saved to a Standard MIDI File.
#[derive(Debug, Clone)]
pub struct MidiProject {
    meter: Meter,
    tempo_changes: Vec<(u64, u32)>,
    tracks: Vec<NoteTrack>,
    history: Vec<Vec<NoteTrack>>,
    end_of_song: u64,
    playhead: u64,
}

impl MidiProject {
    /// Empty 4/4 project.
    pub fn new(timebase: u32) -> Result<Self> {
        Ok(Self::from_parts(Meter::four_four(timebase)?, Vec::new(), Vec::new()))
    }

    pub fn from_song(song: SmfSong) -> Self {
        let tracks = song
            .tracks
            .into_iter()
            .map(|t| NoteTrack::with_notes(t.name, t.channel, t.notes))
            .collect();
        Self::from_parts(song.meter, song.tempo_changes, tracks)
    }

    pub fn from_smf_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_song(parse_song(bytes)?))
    }

    fn from_parts(meter: Meter, tempo_changes: Vec<(u64, u32)>, tracks: Vec<NoteTrack>) -> Self {
        let mut project = Self {
            meter,
            tempo_changes,
            tracks,
            history: Vec::new(),
            end_of_song: 0,
            playhead: 0,
        };
        project.update_end_of_song();
        project
    }

    pub fn to_song(&self) -> SmfSong {
        SmfSong {
            timebase: self.meter.timebase(),
            meter: self.meter.clone(),
            tempo_changes: self.tempo_changes.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|t| SmfTrack {
                    name: t.name.clone(),
                    channel: t.channel,
                    notes: t.notes(),
                })
                .collect(),
        }
    }

    pub fn to_smf_bytes(&self) -> Result<Vec<u8>> {
        Ok(song_to_smf(&self.to_song())?)
    }

    pub fn tracks(&self) -> &[NoteTrack] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&NoteTrack> {
        self.tracks.get(index)
    }

    /// Tempo at tick 0, in BPM.
    pub fn initial_bpm(&self) -> f64 {
        self.to_song().initial_bpm()
    }

    pub fn end_of_song(&self) -> u64 {
        self.end_of_song
    }

    pub fn playhead(&self) -> u64 {
        self.playhead
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Restore the last checkpoint. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(tracks) => {
                self.tracks = tracks;
                self.update_end_of_song();
                true
            }
            None => false,
        }
    }
}

impl Project for MidiProject {
    fn meter(&self) -> &Meter {
        &self.meter
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_mut(&mut self, index: usize) -> Option<&mut dyn TrackEvents> {
        self.tracks
            .get_mut(index)
            .map(|t| t as &mut dyn TrackEvents)
    }

    fn insert_track(&mut self, track: NoteTrack, index: usize) {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
    }

    fn update_end_of_song(&mut self) {
        self.end_of_song = self.tracks.iter().map(NoteTrack::end_tick).max().unwrap_or(0);
    }

    fn push_history(&mut self) {
        self.history.push(self.tracks.clone());
    }

    fn jump_to_tick(&mut self, tick: u64) {
        self.playhead = tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notespan::Note;

    #[test]
    fn test_smf_round_trip_keeps_tracks() {
        let mut project = MidiProject::new(480).unwrap();
        project.insert_track(
            NoteTrack::with_notes("bass", 1, vec![Note::new(0, 480, 36, 100)]),
            0,
        );
        project.update_end_of_song();

        let reloaded = MidiProject::from_smf_bytes(&project.to_smf_bytes().unwrap()).unwrap();
        assert_eq!(reloaded.track_count(), 1);
        assert_eq!(reloaded.tracks()[0].name, "bass");
        assert_eq!(reloaded.tracks()[0].notes()[0].duration, 480);
        assert_eq!(reloaded.end_of_song(), 480);
        assert_eq!(reloaded.timebase(), 480);
    }

    #[test]
    fn test_undo_restores_checkpoint() {
        let mut project = MidiProject::new(480).unwrap();
        project.push_history();
        project.insert_track(NoteTrack::new("new", 0), 0);
        assert_eq!(project.track_count(), 1);
        assert!(project.undo());
        assert_eq!(project.track_count(), 0);
        assert!(!project.undo());
    }
}
