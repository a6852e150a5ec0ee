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
use std::{collections::HashMap, fmt, ops::RangeInclusive};

/// Continuous controllers that have a well known name.
const CONTINUOUS_CONTROLLER_NAMES: &[(u8, &str)] = &[
    (0x00, "Bank select"),
    (0x01, "Modulation wheel"),
    (0x06, "Data entry (MSB)"),
    (0x07, "Volume"),
    (0x0a, "Pan"),
    (0x26, "Data entry (LSB)"),
    (0x5b, "Effects 1 depth (External effects)"),
    (0x5d, "Effects 3 depth (Chorus)"),
    (0x64, "RPN (LSB)"),
    (0x65, "RPN (MSB)"),
];

const PITCH_BEND_CENTER: u16 = 0x2000;
const PITCH_BEND_MAX: u16 = 0x3fff;
const SEVEN_BIT_MAX: u16 = 0x7f;

/// The identity of a controller. Two changes aimed at the same controller compare
/// equal, which is what groups them into the same per-track container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Controller {
    PitchBend,
    ProgramChange,
    /// A continuous controller by number (0-127).
    Continuous(u8),
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Controller::PitchBend => write!(f, "pitch-bend"),
            Controller::ProgramChange => write!(f, "program-change"),
            Controller::Continuous(number) => write!(f, "cc{:02x}", number),
        }
    }
}

/// Describes how a controller's values behave.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerInfo {
    controller: Controller,
    name: String,
    range: RangeInclusive<u16>,
    center: u16,
}

impl ControllerInfo {
    fn new(controller: Controller) -> ControllerInfo {
        match controller {
            Controller::PitchBend => ControllerInfo {
                controller,
                name: "Pitch bend".to_string(),
                range: 0..=PITCH_BEND_MAX,
                center: PITCH_BEND_CENTER,
            },
            Controller::ProgramChange => ControllerInfo {
                controller,
                name: "Program change".to_string(),
                range: 0..=SEVEN_BIT_MAX,
                center: 0,
            },
            Controller::Continuous(number) => ControllerInfo {
                controller,
                name: CONTINUOUS_CONTROLLER_NAMES
                    .iter()
                    .find(|(n, _)| *n == number)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| format!("Continuous controller {:02x}", number)),
                range: 0..=SEVEN_BIT_MAX,
                center: 0,
            },
        }
    }

    pub fn controller(&self) -> Controller {
        self.controller
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> RangeInclusive<u16> {
        self.range.clone()
    }

    /// The resting value, used as the previous value of a track's first change.
    pub fn center(&self) -> u16 {
        self.center
    }

    /// Converts a raw value into its display form. Pitch bend folds the raw
    /// 14-bit value around its center; everything else is unchanged.
    pub fn transform_value(&self, value: u16) -> i32 {
        let value = i32::from(value);
        match self.controller {
            Controller::PitchBend => {
                if value >= 0x2000 {
                    value - 0x4000
                } else {
                    value + 0x2000
                }
            }
            _ => value,
        }
    }
}

/// Hands out controller identities and remembers the ones that have been referenced,
/// in the order they were first seen. Owned by the sequence rather than being
/// global state.
#[derive(Default, Debug)]
pub struct ControllerRegistry {
    infos: Vec<ControllerInfo>,
    index: HashMap<Controller, usize>,
}

impl ControllerRegistry {
    pub fn new() -> ControllerRegistry {
        ControllerRegistry::default()
    }

    /// The continuous controller with the given number.
    pub fn continuous(&mut self, number: u8) -> Controller {
        self.intern(Controller::Continuous(number))
    }

    pub fn pitch_bend(&mut self) -> Controller {
        self.intern(Controller::PitchBend)
    }

    pub fn program_change(&mut self) -> Controller {
        self.intern(Controller::ProgramChange)
    }

    /// Records the controller if it has not been seen yet and returns its identity.
    pub fn intern(&mut self, controller: Controller) -> Controller {
        if !self.index.contains_key(&controller) {
            self.index.insert(controller, self.infos.len());
            self.infos.push(ControllerInfo::new(controller));
        }
        controller
    }

    /// Metadata for a controller that has been referenced.
    pub fn info(&self, controller: Controller) -> Option<&ControllerInfo> {
        self.index.get(&controller).map(|index| &self.infos[*index])
    }

    /// Metadata for a controller, registering it if needed.
    pub fn info_or_insert(&mut self, controller: Controller) -> &ControllerInfo {
        self.intern(controller);
        &self.infos[self.index[&controller]]
    }

    /// Every controller referenced so far, in first-seen order.
    pub fn referenced(&self) -> impl Iterator<Item = Controller> + '_ {
        self.infos.iter().map(|info| info.controller)
    }

    /// Pitch bend, program change and every named continuous controller.
    pub fn all(&mut self) -> Vec<Controller> {
        let mut all = vec![self.pitch_bend(), self.program_change()];
        for (number, _) in CONTINUOUS_CONTROLLER_NAMES {
            all.push(self.continuous(*number));
        }
        all
    }
}
