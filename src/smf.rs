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

//! Standard MIDI File decoding.
//!
//! Only format 1 files with a ticks-per-quarter-note division are accepted. Any
//! malformed or unsupported input aborts the whole decode.

use std::{fs, io::Read, path::Path};

use tracing::{info, span, Level};

use crate::{sequence::Sequence, track::Track};

mod error;
mod reader;

pub use error::DecodeError;

const HEADER_ID: &[u8; 4] = b"MThd";
const TRACK_ID: &[u8; 4] = b"MTrk";

/// The only supported layout: several tracks played simultaneously.
const SUPPORTED_FORMAT: u16 = 1;

/// Reads and decodes the file at the given path.
pub fn read_file(path: &Path) -> Result<Sequence, DecodeError> {
    let span = span!(Level::INFO, "read smf");
    let _enter = span.enter();

    info!(file = crate::util::filename_display(path), "Reading MIDI file.");
    decode(&fs::read(path)?)
}

/// Reads everything from the reader and decodes it.
pub fn read<R: Read>(mut reader: R) -> Result<Sequence, DecodeError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    decode(&buf)
}

/// Decodes a complete file held in memory.
pub fn decode(data: &[u8]) -> Result<Sequence, DecodeError> {
    let mut sequence = Sequence::new();
    let mut offset = 0;
    let mut header_seen = false;

    while offset < data.len() {
        let (id, chunk) = read_chunk(data, offset)?;
        let payload_offset = offset + 8;
        offset = payload_offset + chunk.len();

        match &id {
            HEADER_ID => {
                let header = Header::parse(chunk)?;
                info!(
                    format = header.format,
                    tracks = header.tracks,
                    ppqn = header.ppqn,
                    "Read header."
                );
                sequence.set_ppqn(header.ppqn);
                header_seen = true;
            }
            TRACK_ID if header_seen => {
                let index = sequence.add_track(Track::new());
                reader::TrackReader::new(chunk, payload_offset, index).read(&mut sequence)?;
            }
            TRACK_ID => return Err(DecodeError::MissingHeader),
            _ => return Err(DecodeError::UnknownChunk(id)),
        }
    }

    if !header_seen {
        return Err(DecodeError::MissingHeader);
    }

    info!(
        tracks = sequence.tracks().len(),
        length = sequence.length(),
        "Decoded sequence."
    );
    Ok(sequence)
}

/// Splits off the chunk starting at the offset.
fn read_chunk(data: &[u8], offset: usize) -> Result<([u8; 4], &[u8]), DecodeError> {
    let header = data
        .get(offset..offset + 8)
        .ok_or(DecodeError::UnexpectedEof { offset })?;

    let mut id = [0u8; 4];
    id.copy_from_slice(&header[..4]);
    let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let start = offset + 8;
    let chunk = start
        .checked_add(length)
        .and_then(|end| data.get(start..end))
        .ok_or(DecodeError::UnexpectedEof {
            offset: data.len(),
        })?;
    Ok((id, chunk))
}

/// The MThd payload.
struct Header {
    format: u16,
    tracks: u16,
    ppqn: u16,
}

impl Header {
    fn parse(chunk: &[u8]) -> Result<Header, DecodeError> {
        if chunk.len() < 6 {
            return Err(DecodeError::ShortHeader(chunk.len() as u32));
        }

        let field = |i: usize| u16::from_be_bytes([chunk[i], chunk[i + 1]]);
        let header = Header {
            format: field(0),
            tracks: field(2),
            ppqn: field(4),
        };

        if header.format != SUPPORTED_FORMAT {
            return Err(DecodeError::UnsupportedFormat(header.format));
        }
        // A set high bit selects SMPTE timing.
        if header.ppqn & 0x8000 != 0 || header.ppqn == 0 {
            return Err(DecodeError::UnsupportedDivision(header.ppqn));
        }
        Ok(header)
    }
}
