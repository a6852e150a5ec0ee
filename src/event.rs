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

use midly::num::{u14, u4, u7};

use crate::{controller::Controller, midi::Command, util};

/// A time-stamped event. The start tick is only changed by the container that owns
/// the event so that its ordering stays intact.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    start: u64,
    kind: EventKind,
}

/// The closed set of event variants.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Note(Note),
    Tempo(Tempo),
    TimeSignature(TimeSignature),
    ControllerChange(ControllerChange),
    Meta(MetaEvent),
}

impl Event {
    pub fn new(start: u64, kind: EventKind) -> Event {
        Event { start, kind }
    }

    /// Creates a note event.
    pub fn note(start: u64, channel: u4, pitch: u7, velocity: u7, duration: u64) -> Event {
        Event::new(
            start,
            EventKind::Note(Note {
                channel,
                pitch,
                velocity,
                duration,
            }),
        )
    }

    /// Creates a tempo change.
    pub fn tempo(start: u64, bpm: f64) -> Event {
        Event::new(start, EventKind::Tempo(Tempo { bpm }))
    }

    /// Creates a time signature change.
    pub fn time_signature(
        start: u64,
        numerator: u8,
        denominator: u32,
        metronome: u8,
        thirty_seconds_per_quarter: u8,
    ) -> Event {
        Event::new(
            start,
            EventKind::TimeSignature(TimeSignature {
                numerator,
                denominator,
                metronome,
                thirty_seconds_per_quarter,
            }),
        )
    }

    /// Creates a controller change.
    pub fn controller_change(start: u64, channel: u4, controller: Controller, value: u16) -> Event {
        Event::new(
            start,
            EventKind::ControllerChange(ControllerChange {
                channel,
                controller,
                value,
            }),
        )
    }

    /// Creates an uninterpreted meta event.
    pub fn meta(start: u64, kind: u8, data: Vec<u8>) -> Event {
        Event::new(start, EventKind::Meta(MetaEvent { kind, data }))
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub(crate) fn set_start(&mut self, start: u64) {
        self.start = start;
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The tick a note stops sounding. Other events have no extent.
    pub fn end(&self) -> Option<u64> {
        match &self.kind {
            EventKind::Note(note) => Some(self.start + note.duration),
            _ => None,
        }
    }

    /// Sets a note's duration so that it ends at the given tick.
    pub fn set_end(&mut self, end: u64) {
        let start = self.start;
        if let EventKind::Note(note) = &mut self.kind {
            note.duration = end.saturating_sub(start);
        }
    }

    /// Whether the event has to reach the sequencer.
    pub fn is_audible(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::TimeSignature(_) | EventKind::Meta(_)
        )
    }

    /// Whether the event should still be sent when it is discovered after its start
    /// tick has passed. Late notes are dropped; state changes are not.
    pub fn plays_delayed(&self) -> bool {
        !matches!(self.kind, EventKind::Note(_))
    }

    /// Renders the event into a sequencer command. Events that are not audible
    /// produce nothing.
    pub fn command(&self) -> Option<Command> {
        match &self.kind {
            EventKind::Note(note) => Some(Command::Note {
                channel: note.channel,
                key: note.pitch,
                velocity: note.velocity,
                duration: note.duration,
            }),
            EventKind::Tempo(tempo) => Some(Command::Tempo {
                micros_per_quarter: tempo.micros_per_quarter(),
            }),
            EventKind::ControllerChange(change) => Some(change.command()),
            EventKind::TimeSignature(_) | EventKind::Meta(_) => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::Note(note) => write!(
                f,
                "Note: {} {} {} {} {}",
                self.start,
                note.channel.as_int(),
                note.pitch.as_int(),
                note.velocity.as_int(),
                note.duration
            ),
            EventKind::Tempo(tempo) => write!(f, "Tempo: {} {:.2}bpm", self.start, tempo.bpm),
            EventKind::TimeSignature(ts) => write!(
                f,
                "TimeSignature: {} {}/{}",
                self.start, ts.numerator, ts.denominator
            ),
            EventKind::ControllerChange(change) => write!(
                f,
                "ControllerChange: {} {} {} {}",
                self.start,
                change.channel.as_int(),
                change.controller,
                change.value
            ),
            EventKind::Meta(meta) => write!(
                f,
                "Meta: {} {:02x} ({} bytes)",
                self.start,
                meta.kind,
                meta.data.len()
            ),
        }
    }
}

/// A sounding note.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub channel: u4,
    pub pitch: u7,
    pub velocity: u7,
    /// Length in ticks.
    pub duration: u64,
}

/// A tempo change.
#[derive(Clone, Debug, PartialEq)]
pub struct Tempo {
    pub bpm: f64,
}

impl Tempo {
    /// The tempo in the sequencer's microseconds-per-quarter-note form.
    pub fn micros_per_quarter(&self) -> u32 {
        util::bpm_to_micros(self.bpm)
    }
}

/// A time signature change. Only used for mapping ticks to bars and beats.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u32,
    /// MIDI clocks per metronome click.
    pub metronome: u8,
    /// Notated 32nd notes per quarter note.
    pub thirty_seconds_per_quarter: u8,
}

/// A change of a controller's value on a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerChange {
    pub channel: u4,
    pub controller: Controller,
    /// The raw value: 14 bits for pitch bend, 7 bits otherwise.
    pub value: u16,
}

impl ControllerChange {
    fn command(&self) -> Command {
        let channel = self.channel;
        match self.controller {
            Controller::PitchBend => Command::PitchBend {
                channel,
                value: u14::from(self.value),
            },
            Controller::ProgramChange => Command::ProgramChange {
                channel,
                program: u7::from(self.value as u8),
            },
            Controller::Continuous(number) => Command::Controller {
                channel,
                controller: u7::from(number),
                value: u7::from(self.value as u8),
            },
        }
    }
}

/// A meta event that is kept without interpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaEvent {
    pub kind: u8,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_note_end() {
        let mut note = Event::note(96, u4::from(0), u7::from(60), u7::from(100), 100);
        assert_eq!(Some(196), note.end());

        note.set_end(480);
        assert_eq!(Some(480), note.end());
        match note.kind() {
            EventKind::Note(note) => assert_eq!(384, note.duration),
            _ => panic!("expected a note"),
        }

        assert_eq!(None, Event::tempo(0, 120.0).end());
    }

    #[test]
    fn test_audibility() {
        let note = Event::note(0, u4::from(0), u7::from(60), u7::from(100), 10);
        let tempo = Event::tempo(0, 120.0);
        let ts = Event::time_signature(0, 4, 4, 24, 8);
        let cc = Event::controller_change(0, u4::from(0), Controller::Continuous(7), 100);
        let meta = Event::meta(0, 0x01, b"text".to_vec());

        assert!(note.is_audible() && !note.plays_delayed());
        assert!(tempo.is_audible() && tempo.plays_delayed());
        assert!(!ts.is_audible());
        assert!(cc.is_audible() && cc.plays_delayed());
        assert!(!meta.is_audible());
        assert!(ts.command().is_none());
        assert!(meta.command().is_none());
    }

    #[test]
    fn test_commands() {
        let note = Event::note(10, u4::from(2), u7::from(64), u7::from(90), 48);
        assert_eq!(
            Some(Command::Note {
                channel: u4::from(2),
                key: u7::from(64),
                velocity: u7::from(90),
                duration: 48,
            }),
            note.command()
        );

        assert_eq!(
            Some(Command::Tempo {
                micros_per_quarter: 500_000
            }),
            Event::tempo(0, 120.0).command()
        );

        let bend = Event::controller_change(0, u4::from(1), Controller::PitchBend, 8192);
        assert_eq!(
            Some(Command::PitchBend {
                channel: u4::from(1),
                value: u14::from(8192),
            }),
            bend.command()
        );

        let program = Event::controller_change(0, u4::from(1), Controller::ProgramChange, 5);
        assert_eq!(
            Some(Command::ProgramChange {
                channel: u4::from(1),
                program: u7::from(5),
            }),
            program.command()
        );

        let volume = Event::controller_change(0, u4::from(1), Controller::Continuous(7), 99);
        assert_eq!(
            Some(Command::Controller {
                channel: u4::from(1),
                controller: u7::from(7),
                value: u7::from(99),
            }),
            volume.command()
        );
    }
}
