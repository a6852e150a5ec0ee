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

use parking_lot::Mutex;
use tracing::debug;

use super::{Command, Schedule, SequencerError};

/// A mock sequencer. Doesn't play anything; it records what it's told and its clock
/// only moves when a test moves it.
#[derive(Clone)]
pub struct Sequencer {
    name: String,
    state: Arc<Mutex<State>>,
}

struct State {
    ppq: u16,
    running: bool,
    tick: u64,
    submitted: Vec<(Schedule, Command)>,
    dropped: usize,
    reject: bool,
}

impl Sequencer {
    /// Gets the given mock sequencer.
    pub fn get(name: &str) -> Sequencer {
        Sequencer {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State {
                ppq: 0,
                running: false,
                tick: 0,
                submitted: Vec::new(),
                dropped: 0,
                reject: false,
            })),
        }
    }

    /// Moves the clock as if time had passed on the hardware.
    pub fn advance_to(&self, tick: u64) {
        self.state.lock().tick = tick;
    }

    /// Everything submitted so far.
    pub fn submitted(&self) -> Vec<(Schedule, Command)> {
        self.state.lock().submitted.clone()
    }

    /// Forgets everything submitted so far.
    pub fn clear_submitted(&self) {
        self.state.lock().submitted.clear();
    }

    /// Makes every later submission fail.
    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().reject = reject;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn ppq(&self) -> u16 {
        self.state.lock().ppq
    }

    /// How many queued commands were discarded by drop_output.
    pub fn dropped(&self) -> usize {
        self.state.lock().dropped
    }
}

impl super::Sequencer for Sequencer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_ppq(&self, ppq: u16) -> Result<(), SequencerError> {
        self.state.lock().ppq = ppq;
        Ok(())
    }

    fn start(&self) -> Result<(), SequencerError> {
        let mut state = self.state.lock();
        state.running = true;
        state.tick = 0;
        Ok(())
    }

    fn stop(&self) -> Result<(), SequencerError> {
        self.state.lock().running = false;
        Ok(())
    }

    fn resume(&self) -> Result<(), SequencerError> {
        self.state.lock().running = true;
        Ok(())
    }

    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), SequencerError> {
        debug!(device = self.name, micros_per_quarter, "Set tempo.");
        Ok(())
    }

    fn tick_position(&self) -> u64 {
        self.state.lock().tick
    }

    fn set_tick_position(&self, tick: u64) -> Result<(), SequencerError> {
        self.state.lock().tick = tick;
        Ok(())
    }

    fn submit(&self, schedule: Schedule, command: Command) -> Result<(), SequencerError> {
        let mut state = self.state.lock();
        if state.reject {
            return Err(SequencerError::Rejected(command));
        }

        debug!(device = self.name, ?schedule, ?command, "Submitted command.");
        state.submitted.push((schedule, command));
        Ok(())
    }

    fn drop_output(&self) -> Result<(), SequencerError> {
        let mut state = self.state.lock();
        let tick = state.tick;
        let before = state.submitted.len();
        state
            .submitted
            .retain(|(schedule, _)| !matches!(schedule, Schedule::Tick(at) if *at > tick));
        state.dropped += before - state.submitted.len();
        Ok(())
    }
}

impl fmt::Display for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use midly::num::{u4, u7};

    use super::*;
    use crate::midi::Sequencer as _;

    fn note(tick: u64) -> (Schedule, Command) {
        (
            Schedule::Tick(tick),
            Command::Note {
                channel: u4::from(0),
                key: u7::from(60),
                velocity: u7::from(100),
                duration: 10,
            },
        )
    }

    #[test]
    fn test_records_submissions() {
        let sequencer = Sequencer::get("mock");
        let (schedule, command) = note(10);
        sequencer.submit(schedule, command).expect("submit");
        assert_eq!(vec![note(10)], sequencer.submitted());

        sequencer.reject_submissions(true);
        let (schedule, command) = note(20);
        assert!(matches!(
            sequencer.submit(schedule, command),
            Err(SequencerError::Rejected(_))
        ));
        assert_eq!(1, sequencer.submitted().len());
    }

    #[test]
    fn test_transport() {
        let sequencer = Sequencer::get("mock");
        assert!(!sequencer.is_running());
        sequencer.set_tick_position(100).expect("set tick");
        sequencer.resume().expect("resume");
        assert!(sequencer.is_running());
        assert_eq!(100, sequencer.tick_position());

        sequencer.stop().expect("stop");
        assert!(!sequencer.is_running());
        assert_eq!(100, sequencer.tick_position());

        sequencer.start().expect("start");
        assert_eq!(0, sequencer.tick_position());
    }

    #[test]
    fn test_drop_output_discards_pending() {
        let sequencer = Sequencer::get("mock");
        for tick in [0, 50, 100, 150] {
            let (schedule, command) = note(tick);
            sequencer.submit(schedule, command).expect("submit");
        }
        sequencer.advance_to(75);
        sequencer.drop_output().expect("drop output");
        assert_eq!(vec![note(0), note(50)], sequencer.submitted());
        assert_eq!(2, sequencer.dropped());
    }
}
