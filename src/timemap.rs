// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use crate::{
    event::{EventKind, TimeSignature},
    events::OrderedEvents,
};

/// A tick position expressed musically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// No time signature is known, so the raw tick is all there is.
    Ticks(u64),
    /// One-based bar and beat plus the ticks into the beat.
    Musical { bar: u64, beat: u64, remainder: u64 },
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Ticks(tick) => write!(f, "{}", tick),
            Position::Musical {
                bar,
                beat,
                remainder,
            } => write!(f, "{}:{:>2}.{:>4}", bar, beat, remainder),
        }
    }
}

/// Bar and beat lengths of a time signature at the given resolution.
struct Meter {
    numerator: u64,
    beat_length: u64,
}

impl Meter {
    fn new(ppqn: u16, signature: &TimeSignature) -> Meter {
        let denominator = u64::from(signature.denominator).max(1);
        Meter {
            numerator: u64::from(signature.numerator).max(1),
            beat_length: (u64::from(ppqn) * 4 / denominator).max(1),
        }
    }

    fn bar_length(&self) -> u64 {
        self.beat_length * self.numerator
    }
}

/// Maps a tick onto bar/beat/remainder using the given time signature timeline.
/// The first signature governs everything from tick 0; each later one starts a new
/// segment whose whole bars are added to the running bar count.
pub fn bar_beat_pulse(ppqn: u16, time_signatures: &OrderedEvents, tick: u64) -> Position {
    let mut signatures = time_signatures
        .iter()
        .filter_map(|(_, event)| match event.kind() {
            EventKind::TimeSignature(signature) => Some((event.start(), signature)),
            _ => None,
        })
        .peekable();

    let Some((_, first)) = signatures.next() else {
        return Position::Ticks(tick);
    };

    let mut meter = Meter::new(ppqn, first);
    let mut segment_start = 0;
    let mut bars = 1;
    while let Some((next_start, next)) = signatures.next_if(|(start, _)| tick >= *start) {
        bars += (next_start - segment_start) / meter.bar_length();
        segment_start = next_start;
        meter = Meter::new(ppqn, next);
    }

    let offset = tick - segment_start;
    Position::Musical {
        bar: bars + offset / meter.bar_length(),
        beat: (offset / meter.beat_length) % meter.numerator + 1,
        remainder: offset % meter.beat_length,
    }
}
