//! Measure layout of a song: where bars and beats fall in tick space.
//!
//! A [`Measure`] is a run of bars sharing one time signature, starting at
//! `start_tick`. The last run extends forever. Bar numbers (`index`) are
//! 0-based and continue across runs.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A run of bars with one time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub start_tick: u64,
    /// 0-based bar number of the first bar in this run.
    pub index: u32,
    pub numerator: u8,
    pub denominator: u8,
}

impl Measure {
    pub fn ticks_per_beat(&self, timebase: u32) -> u64 {
        (timebase as u64 * 4) / self.denominator.max(1) as u64
    }

    pub fn bar_ticks(&self, timebase: u32) -> u64 {
        self.ticks_per_beat(timebase) * self.numerator as u64
    }
}

/// One beat position inside a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    pub tick: u64,
    /// 0-based bar number.
    pub measure: u32,
    /// Beat index within the bar; 0 is the downbeat.
    pub beat: u8,
}

impl Beat {
    pub fn is_downbeat(&self) -> bool {
        self.beat == 0
    }
}

/// Validated measure list plus the timebase it is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    timebase: u32,
    measures: Vec<Measure>,
}

impl Meter {
    pub fn new(timebase: u32, mut measures: Vec<Measure>) -> Result<Self> {
        if timebase == 0 {
            return Err(Error::InvalidMeter("timebase must be positive".into()));
        }
        if measures.is_empty() {
            return Err(Error::InvalidMeter("no measures".into()));
        }
        measures.sort_by_key(|m| m.start_tick);
        for m in &measures {
            if m.numerator == 0 || m.denominator == 0 || m.bar_ticks(timebase) == 0 {
                return Err(Error::InvalidMeter(format!(
                    "unusable time signature {}/{} at tick {}",
                    m.numerator, m.denominator, m.start_tick
                )));
            }
        }
        Ok(Self { timebase, measures })
    }

    /// Constant 4/4 from tick 0.
    pub fn four_four(timebase: u32) -> Result<Self> {
        Self::new(
            timebase,
            vec![Measure {
                start_tick: 0,
                index: 0,
                numerator: 4,
                denominator: 4,
            }],
        )
    }

    /// Build from time-signature changes `(tick, numerator, denominator)`.
    ///
    /// Bar numbers are assigned by counting whole bars of the previous run;
    /// a change landing mid-bar starts a new bar. Falls back to 4/4 when the
    /// list is empty or has no entry at tick 0.
    pub fn from_time_signatures(timebase: u32, changes: &[(u64, u8, u8)]) -> Result<Self> {
        let mut changes: Vec<_> = changes.to_vec();
        changes.sort_by_key(|c| c.0);
        changes.dedup_by_key(|c| c.0);

        let mut measures: Vec<Measure> = Vec::with_capacity(changes.len() + 1);
        if changes.first().map_or(true, |c| c.0 > 0) {
            measures.push(Measure {
                start_tick: 0,
                index: 0,
                numerator: 4,
                denominator: 4,
            });
        }

        for (tick, numerator, denominator) in changes {
            let index = match measures.last() {
                Some(prev) => {
                    let bar = prev.bar_ticks(timebase).max(1);
                    let span = tick - prev.start_tick;
                    prev.index + span.div_ceil(bar) as u32
                }
                None => 0,
            };
            measures.push(Measure {
                start_tick: tick,
                index,
                numerator,
                denominator,
            });
        }

        Self::new(timebase, measures)
    }

    pub fn timebase(&self) -> u32 {
        self.timebase
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    fn run_at(&self, tick: u64) -> usize {
        self.measures
            .iter()
            .rposition(|m| m.start_tick <= tick)
            .unwrap_or(0)
    }

    fn next_run_start(&self, run: usize) -> Option<u64> {
        self.measures.get(run + 1).map(|m| m.start_tick)
    }

    /// 0-based bar number and start tick of the bar containing `tick`.
    pub fn bar_at(&self, tick: u64) -> (u32, u64) {
        let m = &self.measures[self.run_at(tick)];
        if tick <= m.start_tick {
            return (m.index, m.start_tick);
        }
        let bar = m.bar_ticks(self.timebase);
        let k = (tick - m.start_tick) / bar;
        let index = m.index.saturating_add(u32::try_from(k).unwrap_or(u32::MAX));
        (index, m.start_tick + k * bar)
    }

    pub fn measure_start(&self, tick: u64) -> u64 {
        self.bar_at(tick).1
    }

    /// Start tick of the bar after the one containing `tick`.
    ///
    /// A time-signature change cuts the current bar short. Saturates at
    /// `u64::MAX` for the last bar of tick space.
    pub fn next_measure_tick(&self, tick: u64) -> u64 {
        let run = self.run_at(tick);
        let start = self.measure_start(tick);
        let next = start.saturating_add(self.measures[run].bar_ticks(self.timebase));
        match self.next_run_start(run) {
            Some(boundary) if boundary > start && boundary < next => boundary,
            _ => next,
        }
    }

    /// Bar length in ticks for the bar containing `tick`.
    pub fn bar_ticks_at(&self, tick: u64) -> u64 {
        self.measures[self.run_at(tick)].bar_ticks(self.timebase)
    }

    /// Every beat position with `from <= tick < to`.
    pub fn beats_in_range(&self, from: u64, to: u64) -> Vec<Beat> {
        let mut beats = Vec::new();
        if to <= from {
            return beats;
        }

        let mut bar_start = self.measure_start(from);
        while bar_start < to {
            let run = self.run_at(bar_start);
            let m = &self.measures[run];
            let (measure, _) = self.bar_at(bar_start);
            let tpb = m.ticks_per_beat(self.timebase);
            let bar_end = self.next_measure_tick(bar_start);

            for beat in 0..m.numerator {
                let tick = bar_start.saturating_add(beat as u64 * tpb);
                if tick >= bar_end || tick >= to {
                    break;
                }
                if tick >= from {
                    beats.push(Beat {
                        tick,
                        measure,
                        beat,
                    });
                }
            }
            bar_start = bar_end;
        }

        beats
    }

    /// Downbeats (bar starts) with `from <= tick < to`.
    ///
    /// Walks bar starts only, so the cost is one entry per bar.
    pub fn downbeats_in_range(&self, from: u64, to: u64) -> Vec<Beat> {
        let mut downbeats = Vec::new();
        let mut bar_start = self.measure_start(from);
        while bar_start < to {
            if bar_start >= from {
                downbeats.push(Beat {
                    tick: bar_start,
                    measure: self.bar_at(bar_start).0,
                    beat: 0,
                });
            }
            bar_start = self.next_measure_tick(bar_start);
        }
        downbeats
    }

    /// Number of bar starts with `from <= tick < to`, without enumerating them.
    pub fn count_downbeats(&self, from: u64, to: u64) -> u64 {
        if to <= from {
            return 0;
        }
        let (first, first_start) = self.bar_at(from);
        let first = if first_start < from { first as u64 + 1 } else { first as u64 };
        let (last, _) = self.bar_at(to - 1);
        (last as u64 + 1).saturating_sub(first)
    }
}
