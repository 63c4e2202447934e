//! Pure transforms over [`NotePayload`].
//!
//! These reconcile a generated clip with a destination selection: cut it to
//! length, loop it to fill, and move it between timebases and origins.
//! Nothing here touches a track; see [`crate::track`] for writes.

use crate::bar_range::BarRange;
use crate::note::{Note, NotePayload};
use serde::{Deserialize, Serialize};

/// Intersect every note with `[0, len)`.
///
/// Notes with an empty intersection are dropped, the rest are trimmed. The
/// result keeps tick 0 as its origin.
pub fn clamp_to_length(payload: &NotePayload, len: u64) -> NotePayload {
    if len == 0 {
        return NotePayload::empty(payload.timebase);
    }

    let notes = payload
        .notes
        .iter()
        .filter_map(|note| {
            let start = note.tick;
            let end = note.end();
            if start >= len || end == 0 {
                return None;
            }
            let clipped_end = end.min(len);
            Some(Note {
                tick: start,
                duration: clipped_end.saturating_sub(start).max(1),
                ..*note
            })
        })
        .collect();

    NotePayload {
        timebase: payload.timebase,
        notes,
    }
}

/// Shift notes left by whole bars so the earliest note lands in bar zero.
pub fn normalize_bar_start_to_zero(payload: &NotePayload, bar_ticks: u64) -> NotePayload {
    let Some(min_tick) = payload.min_tick() else {
        return payload.clone();
    };
    if bar_ticks == 0 {
        return payload.clone();
    }

    let offset = (min_tick / bar_ticks) * bar_ticks;
    if offset == 0 {
        return payload.clone();
    }

    NotePayload {
        timebase: payload.timebase,
        notes: payload
            .notes
            .iter()
            .map(|note| Note {
                tick: note.tick.saturating_sub(offset),
                ..*note
            })
            .collect(),
    }
}

/// Repeat the notes every `loop_len` ticks until `total_len` is covered.
///
/// Repetitions starting at or past `total_len` are dropped and notes that
/// cross it are shortened.
pub fn tile_to_length(payload: &NotePayload, loop_len: u64, total_len: u64) -> NotePayload {
    if loop_len == 0 {
        return clamp_to_length(payload, total_len);
    }

    let mut notes = Vec::new();
    let mut offset = 0u64;
    while offset < total_len {
        for note in &payload.notes {
            let tick = note.tick + offset;
            if tick >= total_len {
                continue;
            }
            notes.push(Note {
                tick,
                duration: note.duration.min(total_len - tick).max(1),
                ..*note
            });
        }
        offset += loop_len;
    }

    NotePayload {
        timebase: payload.timebase,
        notes,
    }
}

/// Rescale from the payload's timebase to `target_timebase` and move the
/// origin to `base_tick`.
///
/// With `scale == false` ticks are kept as-is and the payload keeps its own
/// timebase. Durations never drop below 1. Purely additive: the output has
/// exactly as many notes as the input.
pub fn scale_and_shift(
    payload: &NotePayload,
    base_tick: u64,
    target_timebase: u32,
    scale: bool,
) -> NotePayload {
    let scaled = scale && payload.timebase > 0;
    let factor = if scaled {
        target_timebase as f64 / payload.timebase as f64
    } else {
        1.0
    };

    let notes = payload
        .notes
        .iter()
        .map(|note| Note {
            tick: (note.tick as f64 * factor).round().max(0.0) as u64 + base_tick,
            duration: ((note.duration as f64 * factor).round() as u64).max(1),
            ..*note
        })
        .collect();

    NotePayload {
        timebase: if scaled { target_timebase } else { payload.timebase },
        notes,
    }
}

/// Convert a payload into another timebase, keeping its origin.
pub fn rescale(payload: &NotePayload, target_timebase: u32) -> NotePayload {
    scale_and_shift(payload, 0, target_timebase, true)
}

/// Bar count of a payload from its furthest note end, rounded up.
///
/// Best-effort: trailing rests are invisible, so a clip whose last bar is
/// silent reads as one bar shorter.
pub fn estimate_bars(payload: &NotePayload, bar_ticks: u64) -> u32 {
    if bar_ticks == 0 {
        return 0;
    }
    payload.max_end().div_ceil(bar_ticks) as u32
}

/// How [`reconcile_length`] fitted a clip into its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Reconciliation {
    /// Clip was at least as long as the destination; its head was kept.
    Clamped { artifact_bars: u32 },
    /// Clip was shorter; it was looped to fill the destination.
    Tiled { artifact_bars: u32, loop_len: u64 },
}

/// Fit a clip (already in the destination timebase, origin 0) to `dest`.
///
/// `artifact_bars` is the clip's bar count as requested from the backend;
/// when unknown it is estimated from the notes. Longer-or-equal clips are
/// cut to the destination, shorter ones are tiled and clamped again to
/// absorb rounding overshoot.
pub fn reconcile_length(
    payload: &NotePayload,
    artifact_bars: Option<u32>,
    dest: &BarRange,
    bar_ticks: u64,
) -> (NotePayload, Reconciliation) {
    let artifact_bars = artifact_bars
        .filter(|bars| *bars > 0)
        .unwrap_or_else(|| estimate_bars(payload, bar_ticks));
    let total_len = dest.len();

    if artifact_bars >= dest.bars || artifact_bars == 0 {
        return (
            clamp_to_length(payload, total_len),
            Reconciliation::Clamped { artifact_bars },
        );
    }

    let loop_len = artifact_bars as u64 * bar_ticks;
    let tiled = tile_to_length(payload, loop_len, total_len);
    (
        clamp_to_length(&tiled, total_len),
        Reconciliation::Tiled {
            artifact_bars,
            loop_len,
        },
    )
}
