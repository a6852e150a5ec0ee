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
    controller::ControllerRegistry,
    event::Event,
    timemap::{self, Position},
    track::{EventRef, Track},
};

/// The resolution of a sequence that was not read from a file.
pub const DEFAULT_PPQN: u16 = 96;

/// The initial length of a new sequence, in bars of 4/4.
const DEFAULT_LENGTH_BARS: u64 = 10;

/// The number of tracks in a default sequence, tempo track included.
const DEFAULT_TRACKS: usize = 3;

/// Metronome clicks of the default time signature: one per quarter note.
const DEFAULT_METRONOME: u8 = DEFAULT_PPQN as u8;

/// A sequence of tracks. The first track added carries the tempo and time
/// signature changes.
pub struct Sequence {
    ppqn: u16,
    length: u64,
    tracks: Vec<Track>,
    controllers: ControllerRegistry,
    play_cursor: u64,
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::new()
    }
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Sequence {
        Sequence {
            ppqn: DEFAULT_PPQN,
            length: u64::from(DEFAULT_PPQN) * 4 * DEFAULT_LENGTH_BARS,
            tracks: Vec::new(),
            controllers: ControllerRegistry::new(),
            play_cursor: 0,
        }
    }

    /// Creates a sequence with three tracks, the first carrying the tempo, set to
    /// 120 bpm in 4/4.
    pub fn with_default_tracks() -> Sequence {
        let mut sequence = Sequence::new();
        for _ in 0..DEFAULT_TRACKS {
            sequence.add_track(Track::new());
        }
        sequence.add_tempo_event(Event::tempo(0, 120.0));
        sequence.add_tempo_event(Event::time_signature(0, 4, 4, DEFAULT_METRONOME, 8));
        sequence
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    pub fn set_ppqn(&mut self, ppqn: u16) {
        self.ppqn = ppqn;
    }

    /// The length in ticks.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Grows the length to cover the tick if needed.
    pub fn extend_length(&mut self, tick: u64) {
        if self.length < tick {
            self.length = tick;
        }
    }

    /// Adds a track and returns its index. The first track becomes the tempo track.
    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// All tracks, tempo track first.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// The tracks after the tempo track.
    pub fn regular_tracks(&self) -> &[Track] {
        self.tracks.get(1..).unwrap_or_default()
    }

    pub fn tempo_track(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Adds a tempo or time signature change to the tempo track, creating the
    /// tempo track if the sequence has none.
    pub fn add_tempo_event(&mut self, event: Event) -> EventRef {
        if self.tracks.is_empty() {
            self.add_track(Track::new());
        }
        self.tracks[0].add_event(event)
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.controllers
    }

    /// The tick the playback cursor is at.
    pub fn play_cursor(&self) -> u64 {
        self.play_cursor
    }

    pub fn set_play_cursor(&mut self, tick: u64) {
        self.play_cursor = tick;
    }

    /// The start of the event following the given one, or the sequence length for
    /// the last event of its container.
    pub fn next_start(&self, track: usize, event: EventRef) -> Option<u64> {
        let events = self.tracks.get(track)?.events(event.category)?;
        events.get(event.id)?;
        Some(
            events
                .next(event.id)
                .and_then(|next| events.get(next))
                .map_or(self.length, |next| next.start()),
        )
    }

    /// Maps a tick onto bars and beats using the tempo track's time signatures.
    pub fn bar_beat_pulse(&self, tick: u64) -> Position {
        match self.tempo_track() {
            Some(track) => timemap::bar_beat_pulse(self.ppqn, track.time_signatures(), tick),
            None => Position::Ticks(tick),
        }
    }

    /// The bar/beat/remainder string for the tick.
    pub fn bar_beat_pulse_str(&self, tick: u64) -> String {
        self.bar_beat_pulse(tick).to_string()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ppqn: {}, length: {} ({}), tracks: {}",
            self.ppqn,
            self.length,
            self.bar_beat_pulse_str(self.length),
            self.tracks.len()
        )
    }
}
