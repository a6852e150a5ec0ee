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

//! Tick-ordered event storage.
//!
//! Events live in a slot arena owned by the container. Each slot carries the
//! links to its neighbours, and a separate index vector keeps the slots in
//! start order so positional lookups are a binary search.

use std::fmt;

use crate::event::Event;

/// Identifies an event inside the container that owns it. Ids stay valid until
/// the event is removed, including across start tick changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(usize);

/// Returned when the append fast path is handed an event that would break ordering.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("event at tick {start} cannot be appended after tick {last}")]
pub struct OrderError {
    pub start: u64,
    pub last: u64,
}

struct Slot {
    event: Event,
    previous: Option<EventId>,
    next: Option<EventId>,
}

/// A sequence of events sorted ascending by start tick. Events sharing a start
/// tick keep their insertion order.
#[derive(Default)]
pub struct OrderedEvents {
    /// The arena. Removed events leave a hole that is recycled by the next insert.
    slots: Vec<Option<Slot>>,
    /// Recyclable arena positions.
    free: Vec<usize>,
    /// Event ids in start order.
    order: Vec<EventId>,
    /// The playback cursor.
    play_ptr: Option<EventId>,
}

impl OrderedEvents {
    /// Creates an empty container.
    pub fn new() -> OrderedEvents {
        OrderedEvents::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the insertion index for the given tick: every event before it starts
    /// earlier than the tick, every event at or after it starts at or after the tick.
    pub fn index_for(&self, tick: u64) -> usize {
        self.order.partition_point(|id| self.start_of(*id) < tick)
    }

    /// Inserts the event at its sorted position, after any events with the same start.
    pub fn insert(&mut self, event: Event) -> EventId {
        let index = self
            .order
            .partition_point(|id| self.start_of(*id) <= event.start());
        let id = self.allocate(event);
        self.link_at(index, id);
        id
    }

    /// Appends an event that must not start before the current tail.
    pub fn push(&mut self, event: Event) -> Result<EventId, OrderError> {
        if let Some(last) = self.last() {
            let last = self.start_of(last);
            if event.start() < last {
                return Err(OrderError {
                    start: event.start(),
                    last,
                });
            }
        }

        let id = self.allocate(event);
        self.link_at(self.order.len(), id);
        Ok(id)
    }

    /// Detaches the event from the container and hands it back. The play pointer
    /// moves on to the next event if it was pointing at the removed one.
    pub fn remove(&mut self, id: EventId) -> Option<Event> {
        let index = self.position(id)?;
        self.unlink_at(index);

        if self.play_ptr == Some(id) {
            self.play_ptr = self.order.get(index).copied();
        }

        let slot = self.slots[id.0].take()?;
        self.free.push(id.0);
        Some(slot.event)
    }

    /// Moves the event to a new start tick, relocating it so the container stays
    /// sorted. The id is preserved. Returns false if the id is unknown.
    pub fn set_start(&mut self, id: EventId, tick: u64) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.unlink_at(index);
        if let Some(slot) = self.slots[id.0].as_mut() {
            slot.event.set_start(tick);
        }
        let index = self.order.partition_point(|other| self.start_of(*other) <= tick);
        self.link_at(index, id);
        true
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.slot(id).map(|slot| &slot.event)
    }

    /// Mutable access to an event. The start tick can only be changed through
    /// [`OrderedEvents::set_start`].
    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .map(|slot| &mut slot.event)
    }

    /// The id of the event at the given sorted index.
    pub fn id_at(&self, index: usize) -> Option<EventId> {
        self.order.get(index).copied()
    }

    pub fn first(&self) -> Option<EventId> {
        self.order.first().copied()
    }

    pub fn last(&self) -> Option<EventId> {
        self.order.last().copied()
    }

    pub fn next(&self, id: EventId) -> Option<EventId> {
        self.slot(id).and_then(|slot| slot.next)
    }

    pub fn previous(&self, id: EventId) -> Option<EventId> {
        self.slot(id).and_then(|slot| slot.previous)
    }

    /// Walks the events in start order by following the links.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            events: self,
            current: self.first(),
        }
    }

    /// The event the play pointer is on, if any.
    pub fn play_ptr(&self) -> Option<EventId> {
        self.play_ptr
    }

    /// Points the play pointer at the first event.
    pub fn reset_play_ptr(&mut self) {
        self.play_ptr = self.first();
    }

    /// Points the play pointer at the first event starting at or after the tick.
    pub fn locate_play_ptr(&mut self, tick: u64) {
        self.play_ptr = self.id_at(self.index_for(tick));
    }

    /// Moves the play pointer forward by one event.
    pub fn advance_play_ptr(&mut self) {
        self.play_ptr = self.play_ptr.and_then(|id| self.next(id));
    }

    fn slot(&self, id: EventId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn start_of(&self, id: EventId) -> u64 {
        self.slot(id).map(|slot| slot.event.start()).unwrap_or(0)
    }

    fn allocate(&mut self, event: Event) -> EventId {
        let slot = Some(Slot {
            event,
            previous: None,
            next: None,
        });
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                EventId(index)
            }
            None => {
                self.slots.push(slot);
                EventId(self.slots.len() - 1)
            }
        }
    }

    /// Finds the sorted index of the id. Same-start events are scanned linearly.
    fn position(&self, id: EventId) -> Option<usize> {
        let start = self.slot(id)?.event.start();
        let from = self.index_for(start);
        self.order[from..]
            .iter()
            .take_while(|other| self.start_of(**other) == start)
            .position(|other| *other == id)
            .map(|offset| from + offset)
    }

    /// Splices the id into the order at the given index and fixes up both neighbours.
    fn link_at(&mut self, index: usize, id: EventId) {
        let previous = index.checked_sub(1).and_then(|i| self.id_at(i));
        let next = self.id_at(index);

        if let Some(slot) = self.slots[id.0].as_mut() {
            slot.previous = previous;
            slot.next = next;
        }
        if let Some(previous) = previous.and_then(|p| self.slots[p.0].as_mut()) {
            previous.next = Some(id);
        }
        if let Some(next) = next.and_then(|n| self.slots[n.0].as_mut()) {
            next.previous = Some(id);
        }

        self.order.insert(index, id);
    }

    /// Splices the id at the given index out of the order, relinking its neighbours.
    fn unlink_at(&mut self, index: usize) {
        let id = self.order.remove(index);
        let (previous, next) = match self.slots[id.0].as_mut() {
            Some(slot) => (slot.previous.take(), slot.next.take()),
            None => (None, None),
        };

        if let Some(previous_slot) = previous.and_then(|p| self.slots[p.0].as_mut()) {
            previous_slot.next = next;
        }
        if let Some(next_slot) = next.and_then(|n| self.slots[n.0].as_mut()) {
            next_slot.previous = previous;
        }
    }
}

impl fmt::Debug for OrderedEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(_, event)| event))
            .finish()
    }
}

/// Iterator over a container in start order.
pub struct Iter<'a> {
    events: &'a OrderedEvents,
    current: Option<EventId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (EventId, &'a Event);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let slot = self.events.slot(id)?;
        self.current = slot.next;
        Some((id, &slot.event))
    }
}
