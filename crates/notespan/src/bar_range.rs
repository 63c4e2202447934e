//! Bar-aligned selection ranges.

use crate::meter::Meter;
use crate::note::TickRange;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A bar-aligned tick range with its per-bar boundaries.
///
/// `bar_start_ticks[i]..bar_end_ticks[i]` is bar `start_bar + i` (1-based
/// numbering, as shown to users). The last end equals `to_tick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRange {
    pub from_tick: u64,
    pub to_tick: u64,
    pub bars: u32,
    pub start_bar: u32,
    pub end_bar: u32,
    pub bar_start_ticks: Vec<u64>,
    pub bar_end_ticks: Vec<u64>,
}

impl BarRange {
    pub fn tick_range(&self) -> TickRange {
        TickRange {
            from: self.from_tick,
            to: self.to_tick,
        }
    }

    pub fn len(&self) -> u64 {
        self.to_tick.saturating_sub(self.from_tick)
    }

    pub fn is_empty(&self) -> bool {
        self.to_tick <= self.from_tick
    }
}

/// Range covering every bar touched by `tick_a` and `tick_b`.
///
/// `from` is the earlier bar start, `to` the start of the bar after the
/// later one.
pub fn bar_range_from_two_ticks(meter: &Meter, tick_a: u64, tick_b: u64) -> TickRange {
    let a_start = meter.measure_start(tick_a);
    let b_start = meter.measure_start(tick_b);
    let from = a_start.min(b_start);
    let to = meter.next_measure_tick(a_start.max(b_start));
    TickRange { from, to }
}

/// The single bar containing `tick`.
pub fn bar_range_from_one_tick(meter: &Meter, tick: u64) -> TickRange {
    bar_range_from_two_ticks(meter, tick, tick)
}

/// Expand a tick range into per-bar boundaries.
///
/// Bars are the downbeats inside `[from, to)`. If there are none (zero
/// length, or a range that starts and ends inside one bar without covering
/// its downbeat) a single synthetic bar spanning the whole range is used.
pub fn compute_selection_info(range: TickRange, meter: &Meter) -> BarRange {
    let from = range.from.min(range.to);
    let to = range.from.max(range.to);
    let downbeats = meter.downbeats_in_range(from, to);

    let (first, last) = match (downbeats.first(), downbeats.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return BarRange {
                from_tick: from,
                to_tick: to,
                bars: 1,
                start_bar: 1,
                end_bar: 1,
                bar_start_ticks: vec![from],
                bar_end_ticks: vec![to],
            }
        }
    };

    let starts: Vec<u64> = downbeats.iter().map(|b| b.tick).collect();
    let mut ends: Vec<u64> = starts.iter().skip(1).copied().collect();
    ends.push(to);

    BarRange {
        from_tick: from,
        to_tick: to,
        bars: starts.len() as u32,
        start_bar: first.measure + 1,
        end_bar: last.measure + 1,
        bar_start_ticks: starts,
        bar_end_ticks: ends,
    }
}

/// Selection info for the bars touched by two ticks, in one step.
pub fn select_bars(meter: &Meter, tick_a: u64, tick_b: u64) -> BarRange {
    compute_selection_info(bar_range_from_two_ticks(meter, tick_a, tick_b), meter)
}

/// Largest selection [`try_select_bars`] will expand.
pub const MAX_SELECTION_BARS: u64 = 4096;

/// [`select_bars`] for untrusted ticks: refuses selections longer than
/// [`MAX_SELECTION_BARS`] before building the per-bar lists.
pub fn try_select_bars(meter: &Meter, tick_a: u64, tick_b: u64) -> Result<BarRange> {
    let range = bar_range_from_two_ticks(meter, tick_a, tick_b);
    let bars = meter.count_downbeats(range.from, range.to);
    if bars > MAX_SELECTION_BARS {
        return Err(Error::SelectionTooLong {
            bars,
            max: MAX_SELECTION_BARS,
        });
    }
    Ok(compute_selection_info(range, meter))
}

/// Number of bars needed to hold content ending at `end_exclusive`.
///
/// The exclusive end is converted to the last sounding tick first, so
/// content ending exactly on a barline does not count the next bar.
pub fn bars_from_end_tick(meter: &Meter, end_exclusive: u64) -> u32 {
    if end_exclusive == 0 {
        return 0;
    }
    let bars = meter.count_downbeats(0, end_exclusive);
    u32::try_from(bars).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meter() -> Meter {
        Meter::four_four(480).unwrap()
    }

    #[test]
    fn test_two_ticks_any_order() {
        let m = meter();
        let forward = bar_range_from_two_ticks(&m, 100, 4000);
        let backward = bar_range_from_two_ticks(&m, 4000, 100);
        assert_eq!(forward, backward);
        assert_eq!(forward, TickRange { from: 0, to: 5760 });
    }

    #[test]
    fn test_one_tick_is_its_bar() {
        let m = meter();
        assert_eq!(bar_range_from_one_tick(&m, 1920), TickRange { from: 1920, to: 3840 });
        assert_eq!(bar_range_from_one_tick(&m, 3839), TickRange { from: 1920, to: 3840 });
    }

    #[test]
    fn test_selection_info_lists_bars() {
        let m = meter();
        let info = compute_selection_info(TickRange { from: 1920, to: 7680 }, &m);
        assert_eq!(info.bars, 3);
        assert_eq!(info.start_bar, 2);
        assert_eq!(info.end_bar, 4);
        assert_eq!(info.bar_start_ticks, vec![1920, 3840, 5760]);
        assert_eq!(info.bar_end_ticks, vec![3840, 5760, 7680]);
    }

    #[test]
    fn test_selection_info_degenerate_range_is_one_bar() {
        let m = meter();
        let info = compute_selection_info(TickRange { from: 100, to: 100 }, &m);
        assert_eq!(info.bars, 1);
        assert_eq!(info.start_bar, 1);
        assert_eq!(info.bar_start_ticks, vec![100]);
        assert_eq!(info.bar_end_ticks, vec![100]);

        let inside = compute_selection_info(TickRange { from: 100, to: 900 }, &m);
        assert_eq!(inside.bars, 1);
        assert_eq!(inside.bar_end_ticks, vec![900]);
    }

    #[test]
    fn test_bars_from_end_tick_boundary() {
        let m = meter();
        assert_eq!(bars_from_end_tick(&m, 0), 0);
        assert_eq!(bars_from_end_tick(&m, 1), 1);
        assert_eq!(bars_from_end_tick(&m, 1920), 1);
        assert_eq!(bars_from_end_tick(&m, 1921), 2);
        assert_eq!(bars_from_end_tick(&m, 7680), 4);
    }

    #[test]
    fn test_range_near_end_of_tick_space_stays_ordered() {
        let m = meter();
        let range = bar_range_from_two_ticks(&m, 0, u64::MAX - 10);
        assert_eq!(range.from, 0);
        assert_eq!(range.to, u64::MAX);
        assert!(range.to > range.from);
    }

    #[test]
    fn test_try_select_bars_refuses_huge_selection() {
        let m = meter();
        let err = try_select_bars(&m, 0, u64::MAX - 10).unwrap_err();
        assert!(matches!(err, Error::SelectionTooLong { max: MAX_SELECTION_BARS, .. }));

        let err = try_select_bars(&m, 0, 100_000_000_000).unwrap_err();
        assert!(matches!(err, Error::SelectionTooLong { .. }));
    }

    #[test]
    fn test_try_select_bars_accepts_limit() {
        let m = meter();
        let last = (MAX_SELECTION_BARS - 1) * 1920;
        let info = try_select_bars(&m, 0, last).unwrap();
        assert_eq!(info.bars as u64, MAX_SELECTION_BARS);
        assert!(try_select_bars(&m, 0, last + 1920).is_err());
        assert_eq!(try_select_bars(&m, 100, 4000).unwrap(), select_bars(&m, 100, 4000));
    }
}
