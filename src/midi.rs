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
use std::{fmt, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u14, u4, u7},
    MidiMessage, PitchBend,
};

pub mod midir;
pub mod mock;

/// The MIDI controller number for "all sound off".
const ALL_SOUND_OFF: u8 = 0x78;

/// The number of MIDI channels.
pub const CHANNELS: u8 = 16;

/// A command for the sequencer, addressed to a channel where applicable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// A note with a length; the sequencer sends the note off itself.
    Note {
        channel: u4,
        key: u7,
        velocity: u7,
        duration: u64,
    },
    Controller {
        channel: u4,
        controller: u7,
        value: u7,
    },
    ProgramChange {
        channel: u4,
        program: u7,
    },
    PitchBend {
        channel: u4,
        value: u14,
    },
    /// Changes the queue tempo.
    Tempo { micros_per_quarter: u32 },
    AllSoundOff { channel: u4 },
}

impl Command {
    /// The wire events for the command with their tick offsets from the command's
    /// schedule time. Tempo changes act on the queue and have no wire form.
    pub fn live_events(&self) -> Vec<(u64, LiveEvent<'static>)> {
        match *self {
            Command::Note {
                channel,
                key,
                velocity,
                duration,
            } => vec![
                (
                    0,
                    LiveEvent::Midi {
                        channel,
                        message: MidiMessage::NoteOn { key, vel: velocity },
                    },
                ),
                (
                    duration,
                    LiveEvent::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key,
                            vel: u7::from(0),
                        },
                    },
                ),
            ],
            Command::Controller {
                channel,
                controller,
                value,
            } => vec![(
                0,
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::Controller { controller, value },
                },
            )],
            Command::ProgramChange { channel, program } => vec![(
                0,
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::ProgramChange { program },
                },
            )],
            Command::PitchBend { channel, value } => vec![(
                0,
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::PitchBend {
                        bend: PitchBend(wire_bend(value)),
                    },
                },
            )],
            Command::AllSoundOff { channel } => vec![(
                0,
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::Controller {
                        controller: u7::from(ALL_SOUND_OFF),
                        value: u7::from(0),
                    },
                },
            )],
            Command::Tempo { .. } => Vec::new(),
        }
    }
}

/// When a submitted command takes effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Bypasses the queue.
    Direct,
    /// At the given queue tick.
    Tick(u64),
}

/// Errors reported by a sequencer.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("command rejected by the sequencer: {0:?}")]
    Rejected(Command),

    #[error("no device found with name {0}")]
    NoDevice(String),

    #[error("found too many devices that match ({0}), use a less ambiguous device name")]
    AmbiguousDevice(String),

    #[error("MIDI backend error: {0}")]
    Backend(String),
}

/// A timing queue on a MIDI output. Commands are submitted ahead of time with a
/// tick stamp and are released by the sequencer as its clock reaches them.
pub trait Sequencer: fmt::Display + Send + Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Sets the queue resolution in pulses per quarter note.
    fn set_ppq(&self, ppq: u16) -> Result<(), SequencerError>;

    /// Starts the queue from tick 0.
    fn start(&self) -> Result<(), SequencerError>;

    /// Stops the queue, keeping its tick position.
    fn stop(&self) -> Result<(), SequencerError>;

    /// Continues the queue from its current tick position.
    fn resume(&self) -> Result<(), SequencerError>;

    /// Sets the queue tempo immediately.
    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), SequencerError>;

    /// The queue's current tick position.
    fn tick_position(&self) -> u64;

    /// Moves the queue to the given tick.
    fn set_tick_position(&self, tick: u64) -> Result<(), SequencerError>;

    /// Submits a command.
    fn submit(&self, schedule: Schedule, command: Command) -> Result<(), SequencerError>;

    /// Discards every command that has not been released yet.
    fn drop_output(&self) -> Result<(), SequencerError>;
}

/// Sends "all sound off" to every channel, bypassing the queue.
pub fn all_sound_off(sequencer: &dyn Sequencer) -> Result<(), SequencerError> {
    for channel in 0..CHANNELS {
        sequencer.submit(
            Schedule::Direct,
            Command::AllSoundOff {
                channel: u4::from(channel),
            },
        )?;
    }
    Ok(())
}

/// Lists the MIDI output ports known to midir.
pub fn list_devices() -> Result<Vec<String>, SequencerError> {
    midir::list()
}

/// Gets a sequencer for the device with the given name. Names starting with
/// "mock" give an in-process mock.
pub fn get_device(name: &str, client_name: &str) -> Result<Arc<dyn Sequencer>, SequencerError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Sequencer::get(name)));
    }

    Ok(Arc::new(midir::Sequencer::connect(name, client_name)?))
}

/// Pitch bend values hold the first data byte in their upper seven bits. The
/// wire form writes the low seven bits first, so swap the halves to send the
/// data bytes in the order they were read.
fn wire_bend(value: u14) -> u14 {
    let value = value.as_int();
    u14::from(((value & 0x7f) << 7) | (value >> 7))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_note_expands_to_on_and_off() {
        let events = Command::Note {
            channel: u4::from(1),
            key: u7::from(60),
            velocity: u7::from(100),
            duration: 96,
        }
        .live_events();

        assert_eq!(2, events.len());
        assert_eq!(0, events[0].0);
        assert_eq!(96, events[1].0);

        let mut buf = Vec::new();
        events[0].1.write(&mut buf).expect("write note on");
        assert_eq!(vec![0x91, 60, 100], buf);

        buf.clear();
        events[1].1.write(&mut buf).expect("write note off");
        assert_eq!(vec![0x81, 60, 0], buf);
    }

    #[test]
    fn test_all_sound_off_wire_form() {
        let events = Command::AllSoundOff {
            channel: u4::from(9),
        }
        .live_events();
        let mut buf = Vec::new();
        events[0].1.write(&mut buf).expect("write all sound off");
        assert_eq!(vec![0xb9, 0x78, 0], buf);
    }

    #[test]
    fn test_pitch_bend_keeps_data_byte_order() {
        // Decoded from the data bytes [0x00, 0x40].
        let events = Command::PitchBend {
            channel: u4::from(2),
            value: u14::from(0x40),
        }
        .live_events();
        let mut buf = Vec::new();
        events[0].1.write(&mut buf).expect("write pitch bend");
        assert_eq!(vec![0xe2, 0x00, 0x40], buf);

        // Decoded from the data bytes [0x12, 0x34].
        let events = Command::PitchBend {
            channel: u4::from(0),
            value: u14::from((0x12 << 7) | 0x34),
        }
        .live_events();
        buf.clear();
        events[0].1.write(&mut buf).expect("write pitch bend");
        assert_eq!(vec![0xe0, 0x12, 0x34], buf);
    }

    #[test]
    fn test_tempo_has_no_wire_form() {
        assert!(Command::Tempo {
            micros_per_quarter: 500_000
        }
        .live_events()
        .is_empty());
    }

    #[test]
    fn test_all_sound_off_sweeps_channels() {
        let sequencer = mock::Sequencer::get("mock");
        all_sound_off(&sequencer).expect("all sound off");
        let submitted = sequencer.submitted();
        assert_eq!(16, submitted.len());
        assert!(submitted
            .iter()
            .all(|(schedule, command)| *schedule == Schedule::Direct
                && matches!(command, Command::AllSoundOff { .. })));
    }

    #[test]
    fn test_get_mock_device() {
        let sequencer = get_device("mock-device", "midiseq").expect("mock device");
        assert_eq!("mock-device", sequencer.name());
    }
}
