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
use tracing::{debug, error, info, span, Level, Span};

use crate::{
    events::OrderedEvents,
    midi::{Schedule, Sequencer, SequencerError},
    sequence::Sequence,
    track::Category,
};

/// The default lookahead, in quarter notes.
pub const BUFFER_QN_LENGTH: u64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("unable to submit command to the sequencer: {0}")]
    Submit(#[from] SequencerError),
}

/// The outcome of a refill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refill {
    /// The sequencer still has at least half a buffer queued.
    Idle,
    /// Commands for [start, end) were submitted.
    Filled { start: u64, end: u64, emitted: usize },
}

/// Keeps a sequencer's queue filled a bounded distance ahead of its clock.
pub struct Player {
    /// The lookahead depth in ticks.
    buffer_ticks: u64,
    /// Everything before this tick has been submitted.
    pos: u64,
    span: Span,
}

impl Player {
    /// Creates a player with a lookahead of the given number of quarter notes.
    pub fn new(ppqn: u16, buffer_quarter_notes: u64) -> Player {
        Player {
            buffer_ticks: (u64::from(ppqn) * buffer_quarter_notes).max(1),
            pos: 0,
            span: span!(Level::INFO, "player"),
        }
    }

    pub fn buffer_ticks(&self) -> u64 {
        self.buffer_ticks
    }

    /// The end of the submitted window.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Positions every play pointer for playback from the offset and starts the
    /// sequencer there.
    pub fn start(
        &mut self,
        sequence: &mut Sequence,
        sequencer: &dyn Sequencer,
        offset: u64,
    ) -> Result<(), PlayerError> {
        let _enter = self.span.enter();
        info!(offset, device = sequencer.name(), "Starting playback.");

        for track in sequence.tracks_mut() {
            for category in track.playback_categories() {
                if let Some(events) = track.events_mut(category) {
                    locate(events, category, offset);
                }
            }
        }

        sequencer.set_ppq(sequence.ppqn())?;
        sequencer.set_tick_position(offset)?;
        sequencer.resume()?;
        sequence.set_play_cursor(offset);
        self.pos = offset;
        Ok(())
    }

    /// Submits the next window of commands if the sequencer has drained at least
    /// half of the buffer.
    pub fn refill(
        &mut self,
        sequence: &mut Sequence,
        sequencer: &dyn Sequencer,
    ) -> Result<Refill, PlayerError> {
        let _enter = self.span.enter();

        let hw_tick = sequencer.tick_position();
        if hw_tick < self.pos.saturating_sub(self.buffer_ticks / 2) {
            return Ok(Refill::Idle);
        }

        let start = self.pos;
        self.pos += self.buffer_ticks;
        let end = self.pos;

        let mut emitted = 0;
        for track in sequence.tracks_mut() {
            for category in track.playback_categories() {
                if let Some(events) = track.events_mut(category) {
                    emitted += fill(events, sequencer, start, end)?;
                }
            }
        }

        debug!(hw_tick, start, end, emitted, "Filled buffer.");
        Ok(Refill::Filled {
            start,
            end,
            emitted,
        })
    }
}

/// Points the container at the first event to play from the offset. Containers
/// whose events may land late are rewound so that their state is chased.
fn locate(events: &mut OrderedEvents, category: Category, offset: u64) {
    let first_start = events
        .first()
        .and_then(|id| events.get(id))
        .map(|event| event.start());

    match first_start {
        Some(first) if first < offset && category == Category::Notes => {
            events.locate_play_ptr(offset)
        }
        _ => events.reset_play_ptr(),
    }
}

/// Submits the container's events that start before the end of the window.
fn fill(
    events: &mut OrderedEvents,
    sequencer: &dyn Sequencer,
    start: u64,
    end: u64,
) -> Result<usize, PlayerError> {
    let mut emitted = 0;
    while let Some(event) = events.play_ptr().and_then(|id| events.get(id)) {
        if event.start() >= end {
            break;
        }

        let result = if event.is_audible() && (event.start() >= start || event.plays_delayed())
        {
            match event.command() {
                Some(command) => {
                    let at = event.start().max(start);
                    sequencer.submit(Schedule::Tick(at), command).map(|_| 1)
                }
                None => Ok(0),
            }
        } else {
            Ok(0)
        };
        events.advance_play_ptr();

        match result {
            Ok(count) => emitted += count,
            Err(e) => {
                error!(err = %e, device = sequencer.name(), "Error submitting command.");
                return Err(e.into());
            }
        }
    }
    Ok(emitted)
}
