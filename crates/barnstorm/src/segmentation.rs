//! Segmentation strings: a bar count encoded as lettered runs of at most
//! four bars, e.g. 9 bars is `A4B4C1`.

const MAX_RUN: u32 = 4;
const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode `bars` as a segmentation string.
///
/// Runs past the 26th all use `Z`. Zero bars gives `A0`.
pub fn segmentation_for_bars(bars: u32) -> String {
    if bars == 0 {
        return "A0".to_string();
    }

    let mut seg = String::new();
    let mut left = bars;
    let mut run = 0usize;
    while left > 0 {
        let len = left.min(MAX_RUN);
        let letter = LETTERS.get(run).copied().unwrap_or(b'Z') as char;
        seg.push(letter);
        seg.push_str(&len.to_string());
        left -= len;
        run += 1;
    }
    seg
}
