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

use std::path::Path;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Converts a microseconds-per-quarter-note tempo to beats per minute.
pub fn micros_to_bpm(micros_per_quarter: u32) -> f64 {
    MICROS_PER_MINUTE / f64::from(micros_per_quarter.max(1))
}

/// Converts beats per minute to the nearest microseconds-per-quarter-note tempo.
pub fn bpm_to_micros(bpm: f64) -> u32 {
    if bpm <= 0.0 {
        return u32::MAX;
    }
    (MICROS_PER_MINUTE / bpm).round() as u32
}
