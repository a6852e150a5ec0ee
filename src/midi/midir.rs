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
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{Command, Schedule, SequencerError};

/// How long the dispatch thread sleeps between looking at the queue.
const DISPATCH_INTERVAL: Duration = Duration::from_millis(1);

/// The tempo of a fresh queue: 120 bpm.
const DEFAULT_TEMPO: u32 = 500_000;

/// The resolution of a fresh queue.
const DEFAULT_PPQ: u16 = 96;

/// A software timing queue in front of a midir output port. midir only sends bytes
/// right away, so the queue clock and the release of scheduled commands happen
/// here, on a dedicated dispatch thread.
pub struct Sequencer {
    name: String,
    shared: Arc<Shared>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    queue: Mutex<Queue>,
    closed: AtomicBool,
}

struct Queue {
    connection: MidiOutputConnection,
    clock: Clock,
    pending: BinaryHeap<Reverse<Pending>>,
    /// Ties same-tick entries to submission order.
    sequence: u64,
}

/// Something waiting for the queue clock.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    tick: u64,
    sequence: u64,
    action: Action,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    Send(Vec<u8>),
    Tempo(u32),
}

/// The queue clock. Ticks are derived from the time elapsed since the last anchor.
#[derive(Clone, Copy, Debug)]
struct Clock {
    ppq: u16,
    micros_per_quarter: u32,
    anchor_tick: u64,
    /// Set while the queue is running.
    anchor: Option<Instant>,
}

impl Clock {
    fn new() -> Clock {
        Clock {
            ppq: DEFAULT_PPQ,
            micros_per_quarter: DEFAULT_TEMPO,
            anchor_tick: 0,
            anchor: None,
        }
    }

    fn tick_at(&self, now: Instant) -> u64 {
        match self.anchor {
            Some(anchor) => {
                let elapsed = now.saturating_duration_since(anchor).as_micros();
                let ticks = elapsed * u128::from(self.ppq)
                    / u128::from(self.micros_per_quarter.max(1));
                self.anchor_tick + ticks as u64
            }
            None => self.anchor_tick,
        }
    }

    /// Moves the anchor to now so that later changes apply from this point on.
    fn reanchor(&mut self, now: Instant) {
        self.anchor_tick = self.tick_at(now);
        if self.anchor.is_some() {
            self.anchor = Some(now);
        }
    }

    fn set_tick(&mut self, tick: u64, now: Instant) {
        self.anchor_tick = tick;
        if self.anchor.is_some() {
            self.anchor = Some(now);
        }
    }

    fn run(&mut self, now: Instant) {
        if self.anchor.is_none() {
            self.anchor = Some(now);
        }
    }

    fn pause(&mut self, now: Instant) {
        self.anchor_tick = self.tick_at(now);
        self.anchor = None;
    }
}

impl Queue {
    fn push(&mut self, tick: u64, action: Action) {
        self.sequence += 1;
        self.pending.push(Reverse(Pending {
            tick,
            sequence: self.sequence,
            action,
        }));
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SequencerError> {
        self.connection
            .send(bytes)
            .map_err(|e| SequencerError::Backend(e.to_string()))
    }

    /// Releases everything that is due.
    fn dispatch(&mut self, now: Instant) {
        if self.clock.anchor.is_none() {
            return;
        }

        loop {
            let tick = self.clock.tick_at(now);
            let due = matches!(self.pending.peek(), Some(Reverse(pending)) if pending.tick <= tick);
            if !due {
                return;
            }
            let Some(Reverse(pending)) = self.pending.pop() else {
                return;
            };
            match pending.action {
                Action::Send(bytes) => {
                    if let Err(e) = self.send(&bytes) {
                        error!(err = %e, tick = pending.tick, "Error sending scheduled MIDI event.");
                    }
                }
                Action::Tempo(micros_per_quarter) => {
                    self.clock.reanchor(now);
                    self.clock.micros_per_quarter = micros_per_quarter;
                }
            }
        }
    }
}

impl Sequencer {
    /// Connects to the output port whose name contains the given name.
    pub fn connect(name: &str, client_name: &str) -> Result<Sequencer, SequencerError> {
        let span = span!(Level::INFO, "connect (midir)");
        let _enter = span.enter();

        let output = MidiOutput::new(client_name).map_err(backend)?;
        let (port_name, port) = find_port(&output, name)?;
        let connection = output
            .connect(&port, &format!("{} sequencer", client_name))
            .map_err(backend)?;

        info!(device = port_name, "Connected to MIDI output.");

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                connection,
                clock: Clock::new(),
                pending: BinaryHeap::new(),
                sequence: 0,
            }),
            closed: AtomicBool::new(false),
        });

        let dispatch = {
            let shared = shared.clone();
            thread::spawn(move || {
                while !shared.closed.load(Ordering::Relaxed) {
                    shared.queue.lock().dispatch(Instant::now());
                    spin_sleep::sleep(DISPATCH_INTERVAL);
                }
            })
        };

        Ok(Sequencer {
            name: port_name,
            shared,
            dispatch: Mutex::new(Some(dispatch)),
        })
    }
}

impl super::Sequencer for Sequencer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_ppq(&self, ppq: u16) -> Result<(), SequencerError> {
        let mut queue = self.shared.queue.lock();
        queue.clock.reanchor(Instant::now());
        queue.clock.ppq = ppq.max(1);
        Ok(())
    }

    fn start(&self) -> Result<(), SequencerError> {
        let mut queue = self.shared.queue.lock();
        let now = Instant::now();
        queue.clock.set_tick(0, now);
        queue.clock.run(now);
        Ok(())
    }

    fn stop(&self) -> Result<(), SequencerError> {
        self.shared.queue.lock().clock.pause(Instant::now());
        Ok(())
    }

    fn resume(&self) -> Result<(), SequencerError> {
        self.shared.queue.lock().clock.run(Instant::now());
        Ok(())
    }

    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), SequencerError> {
        let mut queue = self.shared.queue.lock();
        queue.clock.reanchor(Instant::now());
        queue.clock.micros_per_quarter = micros_per_quarter;
        Ok(())
    }

    fn tick_position(&self) -> u64 {
        self.shared.queue.lock().clock.tick_at(Instant::now())
    }

    fn set_tick_position(&self, tick: u64) -> Result<(), SequencerError> {
        self.shared
            .queue
            .lock()
            .clock
            .set_tick(tick, Instant::now());
        Ok(())
    }

    fn submit(&self, schedule: Schedule, command: Command) -> Result<(), SequencerError> {
        let mut queue = self.shared.queue.lock();

        if let Command::Tempo { micros_per_quarter } = command {
            match schedule {
                Schedule::Direct => {
                    queue.clock.reanchor(Instant::now());
                    queue.clock.micros_per_quarter = micros_per_quarter;
                }
                Schedule::Tick(tick) => queue.push(tick, Action::Tempo(micros_per_quarter)),
            }
            return Ok(());
        }

        for (offset, event) in command.live_events() {
            let mut buf: Vec<u8> = Vec::with_capacity(8);
            event
                .write(&mut buf)
                .map_err(|_| SequencerError::Rejected(command))?;

            match schedule {
                Schedule::Direct if offset == 0 => queue.send(&buf)?,
                Schedule::Direct => {
                    let tick = queue.clock.tick_at(Instant::now()) + offset;
                    queue.push(tick, Action::Send(buf));
                }
                Schedule::Tick(tick) => queue.push(tick + offset, Action::Send(buf)),
            }
        }

        Ok(())
    }

    fn drop_output(&self) -> Result<(), SequencerError> {
        let mut queue = self.shared.queue.lock();
        debug!(pending = queue.pending.len(), "Dropping queued MIDI output.");
        queue.pending.clear();
        Ok(())
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Relaxed);
        if let Some(dispatch) = self.dispatch.lock().take() {
            if dispatch.join().is_err() {
                error!("Error while joining the MIDI dispatch thread.");
            }
        }
    }
}

impl fmt::Display for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

fn backend<E: fmt::Display>(e: E) -> SequencerError {
    SequencerError::Backend(e.to_string())
}

/// Finds the single output port whose name contains the given name.
fn find_port(output: &MidiOutput, name: &str) -> Result<(String, MidiOutputPort), SequencerError> {
    let mut matches = Vec::new();
    for port in output.ports() {
        let port_name = output.port_name(&port).map_err(backend)?;
        if port_name.contains(name) {
            matches.push((port_name, port));
        }
    }

    if matches.len() > 1 {
        return Err(SequencerError::AmbiguousDevice(
            matches
                .iter()
                .map(|(port_name, _)| port_name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        ));
    }

    matches
        .pop()
        .ok_or_else(|| SequencerError::NoDevice(name.to_string()))
}

/// Lists midir output ports, sorted by name.
pub fn list() -> Result<Vec<String>, SequencerError> {
    let output = MidiOutput::new("midiseq output listing").map_err(backend)?;
    let mut names = output
        .ports()
        .iter()
        .map(|port| output.port_name(port).map_err(backend))
        .collect::<Result<Vec<String>, SequencerError>>()?;
    names.sort();
    Ok(names)
}
