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
use crate::events::OrderError;

/// Errors that abort decoding a Standard MIDI File. No partially decoded sequence
/// is returned alongside any of these.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported SMF format {0}, only format 1 is supported")]
    UnsupportedFormat(u16),

    #[error("unsupported time division {0:#06x}, only ticks per quarter note is supported")]
    UnsupportedDivision(u16),

    #[error("header chunk is {0} bytes, expected at least 6")]
    ShortHeader(u32),

    #[error("the file does not start with a header chunk")]
    MissingHeader,

    #[error("unknown chunk id {0:?}")]
    UnknownChunk([u8; 4]),

    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("end-of-track marker at offset {offset} is not at the end of its chunk")]
    MisplacedEndOfTrack { offset: usize },

    #[error("track chunk ended without an end-of-track marker")]
    MissingEndOfTrack,

    #[error("note off for channel {channel}, pitch {pitch} at tick {tick} has no matching note on")]
    UnmatchedNoteOff { channel: u8, pitch: u8, tick: u64 },

    #[error("unsupported channel message with status {status:#04x}")]
    UnsupportedMessage { status: u8 },

    #[error("unknown status byte {0:#04x}")]
    UnknownStatus(u8),

    #[error("data byte at offset {offset} without a running status")]
    MissingRunningStatus { offset: usize },

    #[error("invalid data byte {byte:#04x} at offset {offset}")]
    InvalidDataByte { byte: u8, offset: usize },

    #[error("invalid meta event {kind:#04x} with {len} bytes of data")]
    InvalidMeta { kind: u8, len: usize },

    #[error("variable-length quantity at offset {offset} is too long")]
    VlqOverflow { offset: usize },

    #[error("event out of order: {0}")]
    OutOfOrder(#[from] OrderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
