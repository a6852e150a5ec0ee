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
use std::collections::HashMap;

use midly::num::{u4, u7};
use tracing::{debug, info, warn};

use super::DecodeError;
use crate::{
    event::Event,
    sequence::Sequence,
    track::{EventRef, Track},
    util,
};

const META: u8 = 0xff;

const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2f;
const META_TEMPO: u8 = 0x51;
const META_TIME_SIGNATURE: u8 = 0x58;

const NOTE_OFF: u8 = 0x8;
const NOTE_ON: u8 = 0x9;
const NOTE_AFTERTOUCH: u8 = 0xa;
const CONTROLLER: u8 = 0xb;
const PROGRAM_CHANGE: u8 = 0xc;
const CHANNEL_AFTERTOUCH: u8 = 0xd;
const PITCH_BEND: u8 = 0xe;

/// Duration given to a note until its note off is seen.
const PLACEHOLDER_DURATION: u64 = 100;

/// Notated 32nd notes per quarter in ordinary time signatures.
const STANDARD_THIRTY_SECONDS: u8 = 8;

/// The longest variable-length quantity allowed in a file.
const MAX_VLQ_BYTES: usize = 4;

/// Decodes a variable-length quantity starting at the offset. Returns the value
/// and the offset of the byte that follows it.
pub(crate) fn read_vlq(data: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (i, byte) in data.iter().skip(offset).take(MAX_VLQ_BYTES).enumerate() {
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, offset + i + 1));
        }
    }

    if data.len() < offset + MAX_VLQ_BYTES {
        Err(DecodeError::UnexpectedEof { offset: data.len() })
    } else {
        Err(DecodeError::VlqOverflow { offset })
    }
}

/// Decodes one MTrk chunk into a track of the sequence.
pub(super) struct TrackReader<'a> {
    data: &'a [u8],
    /// Offset of the chunk payload in the file, for error reporting.
    base: usize,
    cursor: usize,
    track: usize,
    tick: u64,
    running_status: Option<u8>,
    open_notes: HashMap<(u8, u8), EventRef>,
}

impl<'a> TrackReader<'a> {
    pub(super) fn new(data: &'a [u8], base: usize, track: usize) -> TrackReader<'a> {
        TrackReader {
            data,
            base,
            cursor: 0,
            track,
            tick: 0,
            running_status: None,
            open_notes: HashMap::new(),
        }
    }

    /// Reads events until the end-of-track marker.
    pub(super) fn read(mut self, sequence: &mut Sequence) -> Result<(), DecodeError> {
        while self.cursor < self.data.len() {
            let (delta, next) = read_vlq(self.data, self.cursor)
                .map_err(|e| self.relocate(e))?;
            self.cursor = next;
            self.tick += delta;

            if self.read_event(sequence)? {
                self.finish(sequence);
                return Ok(());
            }
        }
        Err(DecodeError::MissingEndOfTrack)
    }

    /// Reads one event. Returns true at the end-of-track marker.
    fn read_event(&mut self, sequence: &mut Sequence) -> Result<bool, DecodeError> {
        let byte = self.read_byte()?;
        if byte == META {
            return self.read_meta(sequence);
        }

        let (status, data0) = if byte & 0x80 == 0 {
            let status = self
                .running_status
                .ok_or(DecodeError::MissingRunningStatus {
                    offset: self.base + self.cursor - 1,
                })?;
            (status, byte)
        } else {
            if byte >= 0xf0 {
                return Err(DecodeError::UnknownStatus(byte));
            }
            self.running_status = Some(byte);
            (byte, self.read_data_byte()?)
        };

        self.read_channel_event(sequence, status, data0)?;
        Ok(false)
    }

    fn read_meta(&mut self, sequence: &mut Sequence) -> Result<bool, DecodeError> {
        let kind = self.read_byte()?;
        let (len, next) = read_vlq(self.data, self.cursor).map_err(|e| self.relocate(e))?;
        self.cursor = next;
        let data = self.read_bytes(len as usize)?;
        let tick = self.tick;

        match kind {
            META_TRACK_NAME => {
                let name = String::from_utf8_lossy(data).into_owned();
                self.track_mut(sequence).set_name(name);
            }
            META_END_OF_TRACK => {
                if self.cursor != self.data.len() {
                    return Err(DecodeError::MisplacedEndOfTrack {
                        offset: self.base + self.cursor,
                    });
                }
                return Ok(true);
            }
            META_TEMPO => {
                let micros = match data {
                    [a, b, c] => u32::from_be_bytes([0, *a, *b, *c]),
                    _ => return Err(DecodeError::InvalidMeta { kind, len: data.len() }),
                };
                if micros == 0 {
                    return Err(DecodeError::InvalidMeta { kind, len: data.len() });
                }
                sequence.add_tempo_event(Event::tempo(tick, util::micros_to_bpm(micros)));
            }
            META_TIME_SIGNATURE => {
                let &[numerator, power, metronome, thirty_seconds] = data else {
                    return Err(DecodeError::InvalidMeta { kind, len: data.len() });
                };
                let denominator = 1u32
                    .checked_shl(u32::from(power))
                    .ok_or(DecodeError::InvalidMeta { kind, len: data.len() })?;
                if thirty_seconds != STANDARD_THIRTY_SECONDS {
                    warn!(
                        tick,
                        thirty_seconds, "Time signature with non-standard 32nds per quarter."
                    );
                }
                sequence.add_tempo_event(Event::time_signature(
                    tick,
                    numerator,
                    denominator,
                    metronome,
                    thirty_seconds,
                ));
            }
            _ => {
                debug!(tick, kind, len = data.len(), "Meta event.");
                let event = Event::meta(tick, kind, data.to_vec());
                self.track_mut(sequence).push_event(event)?;
            }
        }
        Ok(false)
    }

    fn read_channel_event(
        &mut self,
        sequence: &mut Sequence,
        status: u8,
        data0: u8,
    ) -> Result<(), DecodeError> {
        let channel = status & 0x0f;
        let tick = self.tick;

        match status >> 4 {
            NOTE_OFF => {
                self.read_data_byte()?;
                self.close_note(sequence, channel, data0)?;
            }
            NOTE_ON => {
                let velocity = self.read_data_byte()?;
                if velocity == 0 {
                    self.close_note(sequence, channel, data0)?;
                } else {
                    if self.open_notes.contains_key(&(channel, data0)) {
                        debug!(channel, pitch = data0, tick, "Retriggered a sounding note.");
                        self.close_note(sequence, channel, data0)?;
                    }
                    let note = Event::note(
                        tick,
                        u4::from(channel),
                        u7::from(data0),
                        u7::from(velocity),
                        PLACEHOLDER_DURATION,
                    );
                    let event = self.track_mut(sequence).push_event(note)?;
                    self.open_notes.insert((channel, data0), event);
                }
            }
            CONTROLLER => {
                let value = self.read_data_byte()?;
                let controller = sequence.controllers_mut().continuous(data0);
                let change =
                    Event::controller_change(tick, u4::from(channel), controller, value.into());
                self.track_mut(sequence).push_event(change)?;
            }
            PROGRAM_CHANGE => {
                let controller = sequence.controllers_mut().program_change();
                let change =
                    Event::controller_change(tick, u4::from(channel), controller, data0.into());
                self.track_mut(sequence).push_event(change)?;
            }
            PITCH_BEND => {
                let value = (u16::from(data0) << 7) | u16::from(self.read_data_byte()?);
                let controller = sequence.controllers_mut().pitch_bend();
                let change = Event::controller_change(tick, u4::from(channel), controller, value);
                self.track_mut(sequence).push_event(change)?;
            }
            NOTE_AFTERTOUCH | CHANNEL_AFTERTOUCH => {
                return Err(DecodeError::UnsupportedMessage { status });
            }
            _ => return Err(DecodeError::UnknownStatus(status)),
        }
        Ok(())
    }

    /// Ends the sounding note at the current tick.
    fn close_note(
        &mut self,
        sequence: &mut Sequence,
        channel: u8,
        pitch: u8,
    ) -> Result<(), DecodeError> {
        let tick = self.tick;
        let event = self
            .open_notes
            .remove(&(channel, pitch))
            .ok_or(DecodeError::UnmatchedNoteOff {
                channel,
                pitch,
                tick,
            })?;
        if let Some(note) = self.track_mut(sequence).event_mut(event) {
            note.set_end(tick);
        }
        Ok(())
    }

    fn finish(self, sequence: &mut Sequence) {
        sequence.extend_length(self.tick);

        let track = self.track_mut(sequence);
        for (channel, pitch) in self.open_notes.keys() {
            warn!(
                track = track.name(),
                channel, pitch, "Note still sounding at end of track."
            );
        }
        info!(
            track = track.name(),
            events = track.event_count(),
            length = self.tick,
            "Decoded track."
        );
    }

    fn track_mut<'s>(&self, sequence: &'s mut Sequence) -> &'s mut Track {
        // The reader is only constructed for a track that was just added.
        &mut sequence.tracks_mut()[self.track]
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.cursor)
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.base + self.cursor,
            })?;
        self.cursor += 1;
        Ok(byte)
    }

    fn read_data_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self.read_byte()?;
        if byte & 0x80 != 0 {
            return Err(DecodeError::InvalidDataByte {
                byte,
                offset: self.base + self.cursor - 1,
            });
        }
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let data = self.data;
        let bytes = self
            .cursor
            .checked_add(len)
            .and_then(|end| data.get(self.cursor..end))
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.base + data.len(),
            })?;
        self.cursor += len;
        Ok(bytes)
    }

    /// Moves chunk-relative offsets in an error to file offsets.
    fn relocate(&self, error: DecodeError) -> DecodeError {
        match error {
            DecodeError::UnexpectedEof { offset } => DecodeError::UnexpectedEof {
                offset: self.base + offset,
            },
            DecodeError::VlqOverflow { offset } => DecodeError::VlqOverflow {
                offset: self.base + offset,
            },
            other => other,
        }
    }
}
