//! Laws the transforms must hold for any clip, checked over a spread of
//! hand-built clips.

use notespan::{
    clamp_to_length, reconcile_length, replace_in_range, rescale, scale_and_shift, select_bars,
    tile_to_length, Meter, Note, NotePayload, NoteTrack, TickRange, WriteOptions,
};
use pretty_assertions::assert_eq;

fn clips() -> Vec<NotePayload> {
    vec![
        NotePayload::empty(480),
        NotePayload::new(480, vec![Note::new(0, 480, 60, 100)]),
        NotePayload::new(
            480,
            vec![
                Note::new(0, 240, 60, 100),
                Note::new(240, 240, 62, 90),
                Note::new(1800, 600, 64, 80),
            ],
        ),
        // long tail past several bars
        NotePayload::new(480, vec![Note::new(100, 9000, 40, 70), Note::new(5000, 1, 72, 127)]),
        NotePayload::new(
            960,
            vec![Note::new(0, 960, 48, 100), Note::new(3840, 960, 55, 100)],
        ),
    ]
}

#[test]
fn clamp_is_bounded_and_idempotent() {
    for clip in clips() {
        for len in [1u64, 480, 1920, 3840, 10_000] {
            let once = clamp_to_length(&clip, len);
            assert!(once.notes.iter().all(|n| n.end() <= len && n.duration >= 1));
            assert!(once.notes.len() <= clip.notes.len());
            assert_eq!(clamp_to_length(&once, len), once);
        }
    }
}

#[test]
fn tiled_output_already_fits() {
    for clip in clips() {
        for (loop_len, total) in [(1920u64, 7680u64), (3840, 5760), (480, 480), (1920, 1000), (0, 3840)] {
            let tiled = tile_to_length(&clip, loop_len, total);
            assert_eq!(clamp_to_length(&tiled, total), tiled);
        }
    }
}

#[test]
fn same_timebase_scaling_is_identity() {
    for clip in clips() {
        let tb = clip.timebase;
        assert_eq!(rescale(&clip, tb), clip);
        assert_eq!(scale_and_shift(&clip, 0, tb * 2, false), clip);
    }
}

#[test]
fn scale_and_shift_keeps_note_count() {
    for clip in clips() {
        for target in [96u32, 480, 960, 1920] {
            let out = scale_and_shift(&clip, 7, target, true);
            assert_eq!(out.notes.len(), clip.notes.len());
            assert!(out.notes.iter().all(|n| n.tick >= 7 && n.duration >= 1));
        }
    }
}

#[test]
fn reconcile_never_exceeds_destination() {
    let meter = Meter::four_four(480).unwrap();
    let dest = select_bars(&meter, 1920, 9000);
    for clip in clips() {
        let clip = rescale(&clip, 480);
        for bars in [None, Some(1), Some(2), Some(8)] {
            let (fitted, _) = reconcile_length(&clip, bars, &dest, 1920);
            assert!(fitted.notes.iter().all(|n| n.end() <= dest.len()));
        }
    }
}

#[test]
fn replace_touches_only_the_range() {
    let outside = vec![Note::new(0, 100, 30, 50), Note::new(9000, 100, 31, 50)];
    let inside = Note::new(2000, 100, 32, 50);
    let range = TickRange::new(1920, 3840);

    for clip in clips() {
        let mut all = outside.clone();
        all.push(inside);
        let mut track = NoteTrack::with_notes("t", 0, all);

        let stats = replace_in_range(&mut track, &clip, range, WriteOptions::scaled(480));
        assert_eq!(stats.removed, 1);

        let notes = track.notes();
        for kept in &outside {
            assert!(notes.contains(kept));
        }
        let written: Vec<&Note> = notes.iter().filter(|n| !outside.contains(n)).collect();
        assert_eq!(written.len(), stats.written);
        assert!(written
            .iter()
            .all(|n| n.tick >= range.from && n.end() <= range.to));
    }
}
