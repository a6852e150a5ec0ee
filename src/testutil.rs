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

//! Builders for assembling Standard MIDI Files in tests.

/// Encodes a variable-length quantity.
pub fn vlq(mut value: u64) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Wraps a payload in a chunk header.
pub fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut bytes = id.to_vec();
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// An MThd chunk.
pub fn header(format: u16, tracks: u16, ppqn: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&format.to_be_bytes());
    payload.extend_from_slice(&tracks.to_be_bytes());
    payload.extend_from_slice(&ppqn.to_be_bytes());
    chunk(b"MThd", &payload)
}

/// A complete format 1 file with the given track chunks.
pub fn smf(ppqn: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = header(1, tracks.len() as u16, ppqn);
    for track in tracks {
        bytes.extend_from_slice(track);
    }
    bytes
}

/// Assembles the event stream of an MTrk chunk.
#[derive(Default)]
pub struct TrackBuilder {
    events: Vec<u8>,
}

impl TrackBuilder {
    pub fn new() -> TrackBuilder {
        TrackBuilder::default()
    }

    /// An event with raw bytes after its delta time.
    pub fn event(mut self, delta: u64, bytes: &[u8]) -> TrackBuilder {
        self.events.extend(vlq(delta));
        self.events.extend_from_slice(bytes);
        self
    }

    pub fn meta(self, delta: u64, kind: u8, data: &[u8]) -> TrackBuilder {
        let mut bytes = vec![0xff, kind];
        bytes.extend(vlq(data.len() as u64));
        bytes.extend_from_slice(data);
        self.event(delta, &bytes)
    }

    pub fn name(self, name: &str) -> TrackBuilder {
        self.meta(0, 0x03, name.as_bytes())
    }

    pub fn tempo(self, delta: u64, micros_per_quarter: u32) -> TrackBuilder {
        self.meta(delta, 0x51, &micros_per_quarter.to_be_bytes()[1..])
    }

    pub fn time_signature(self, delta: u64, numerator: u8, power: u8) -> TrackBuilder {
        self.meta(delta, 0x58, &[numerator, power, 24, 8])
    }

    pub fn note_on(self, delta: u64, channel: u8, pitch: u8, velocity: u8) -> TrackBuilder {
        self.event(delta, &[0x90 | channel, pitch, velocity])
    }

    pub fn note_off(self, delta: u64, channel: u8, pitch: u8) -> TrackBuilder {
        self.event(delta, &[0x80 | channel, pitch, 0])
    }

    /// Finishes with an end-of-track marker.
    pub fn end(self, delta: u64) -> Vec<u8> {
        self.meta(delta, 0x2f, &[]).build()
    }

    /// The chunk as is, without adding an end-of-track marker.
    pub fn build(self) -> Vec<u8> {
        chunk(b"MTrk", &self.events)
    }
}
