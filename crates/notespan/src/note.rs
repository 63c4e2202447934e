use serde::{Deserialize, Serialize};

/// A single note in tick coordinates.
///
/// `tick` is relative to whatever origin the owning payload uses (tick 0
/// unless the payload has been shifted). `duration` is at least 1 for any
/// note produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub tick: u64,
    pub duration: u64,
    pub velocity: u8,
    pub note_number: u8,
    #[serde(default)]
    pub channel: u8,
}

impl Note {
    pub fn new(tick: u64, duration: u64, note_number: u8, velocity: u8) -> Self {
        Self {
            tick,
            duration,
            velocity,
            note_number,
            channel: 0,
        }
    }

    /// Exclusive end tick.
    pub fn end(&self) -> u64 {
        self.tick.saturating_add(self.duration)
    }

    /// True if `[tick, tick + duration)` overlaps `[from, to)`.
    pub fn intersects(&self, from: u64, to: u64) -> bool {
        self.tick < to && self.end() > from
    }
}

/// Notes plus the timebase (ticks per quarter note) they are expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub timebase: u32,
    pub notes: Vec<Note>,
}

impl NotePayload {
    pub fn new(timebase: u32, notes: Vec<Note>) -> Self {
        Self { timebase, notes }
    }

    pub fn empty(timebase: u32) -> Self {
        Self {
            timebase,
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Furthest exclusive end tick over all notes (0 when empty).
    pub fn max_end(&self) -> u64 {
        self.notes
            .iter()
            .map(|n| n.end().max(n.tick))
            .max()
            .unwrap_or(0)
    }

    pub fn min_tick(&self) -> Option<u64> {
        self.notes.iter().map(|n| n.tick).min()
    }

    /// Same payload with notes ordered by (tick, pitch).
    pub fn sorted(mut self) -> Self {
        self.notes
            .sort_by_key(|n| (n.tick, n.note_number, n.duration));
        self
    }
}

/// A half-open tick range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickRange {
    pub from: u64,
    pub to: u64,
}

impl TickRange {
    /// Build a range from two ticks in either order.
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            from: a.min(b),
            to: a.max(b),
        }
    }

    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    pub fn contains(&self, tick: u64) -> bool {
        tick >= self.from && tick < self.to
    }
}
