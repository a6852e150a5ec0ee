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
use std::{collections::BTreeMap, fmt};

use crate::{
    controller::{Controller, ControllerRegistry},
    event::{Event, EventKind},
    events::{EventId, OrderError, OrderedEvents},
};

const DEFAULT_TRACK_NAME: &str = "<unnamed>";

/// Names the container inside a track that an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Notes,
    Tempos,
    TimeSignatures,
    Controller(Controller),
    Meta,
}

impl Category {
    /// The category an event is stored under.
    pub fn of(event: &Event) -> Category {
        match event.kind() {
            EventKind::Note(_) => Category::Notes,
            EventKind::Tempo(_) => Category::Tempos,
            EventKind::TimeSignature(_) => Category::TimeSignatures,
            EventKind::ControllerChange(change) => Category::Controller(change.controller),
            EventKind::Meta(_) => Category::Meta,
        }
    }
}

/// Where an event lives: the category container and the id inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventRef {
    pub category: Category,
    pub id: EventId,
}

/// A track owns one ordered container per event category, with one container per
/// controller it has seen.
pub struct Track {
    name: String,
    notes: OrderedEvents,
    tempos: OrderedEvents,
    time_signatures: OrderedEvents,
    meta: OrderedEvents,
    controllers: BTreeMap<Controller, OrderedEvents>,
}

impl Default for Track {
    fn default() -> Self {
        Track::new()
    }
}

impl Track {
    pub fn new() -> Track {
        Track {
            name: DEFAULT_TRACK_NAME.to_string(),
            notes: OrderedEvents::new(),
            tempos: OrderedEvents::new(),
            time_signatures: OrderedEvents::new(),
            meta: OrderedEvents::new(),
            controllers: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Inserts the event into the container for its category.
    pub fn add_event(&mut self, event: Event) -> EventRef {
        let category = Category::of(&event);
        let id = self.container_for(category).insert(event);
        EventRef { category, id }
    }

    /// Appends an event to its container, failing if it starts before the tail.
    pub fn push_event(&mut self, event: Event) -> Result<EventRef, OrderError> {
        let category = Category::of(&event);
        let id = self.container_for(category).push(event)?;
        Ok(EventRef { category, id })
    }

    /// Detaches an event from the track.
    pub fn remove_event(&mut self, event: EventRef) -> Option<Event> {
        self.events_mut(event.category)?.remove(event.id)
    }

    /// Moves an event to a new start tick, keeping its container sorted.
    pub fn set_start(&mut self, event: EventRef, tick: u64) -> bool {
        self.events_mut(event.category)
            .is_some_and(|events| events.set_start(event.id, tick))
    }

    pub fn event(&self, event: EventRef) -> Option<&Event> {
        self.events(event.category)?.get(event.id)
    }

    pub fn event_mut(&mut self, event: EventRef) -> Option<&mut Event> {
        self.events_mut(event.category)?.get_mut(event.id)
    }

    pub fn events(&self, category: Category) -> Option<&OrderedEvents> {
        match category {
            Category::Notes => Some(&self.notes),
            Category::Tempos => Some(&self.tempos),
            Category::TimeSignatures => Some(&self.time_signatures),
            Category::Meta => Some(&self.meta),
            Category::Controller(controller) => self.controllers.get(&controller),
        }
    }

    pub fn events_mut(&mut self, category: Category) -> Option<&mut OrderedEvents> {
        match category {
            Category::Notes => Some(&mut self.notes),
            Category::Tempos => Some(&mut self.tempos),
            Category::TimeSignatures => Some(&mut self.time_signatures),
            Category::Meta => Some(&mut self.meta),
            Category::Controller(controller) => self.controllers.get_mut(&controller),
        }
    }

    pub fn notes(&self) -> &OrderedEvents {
        &self.notes
    }

    pub fn tempos(&self) -> &OrderedEvents {
        &self.tempos
    }

    pub fn time_signatures(&self) -> &OrderedEvents {
        &self.time_signatures
    }

    pub fn meta_events(&self) -> &OrderedEvents {
        &self.meta
    }

    /// The controllers this track has changes for.
    pub fn controllers(&self) -> impl Iterator<Item = Controller> + '_ {
        self.controllers.keys().copied()
    }

    pub fn has_controller(&self, controller: Controller) -> bool {
        self.controllers.contains_key(&controller)
    }

    /// The commonly offered controllers followed by any others this track uses.
    pub fn device_controllers(&self, registry: &mut ControllerRegistry) -> Vec<Controller> {
        let mut controllers = registry.all();
        for controller in self.controllers() {
            if !controllers.contains(&controller) {
                controllers.push(registry.intern(controller));
            }
        }
        controllers
    }

    /// The value the controller had before the given change: the previous change's
    /// value, or the controller's center for the first change.
    pub fn previous_value(
        &self,
        event: EventRef,
        registry: &mut ControllerRegistry,
    ) -> Option<u16> {
        let Category::Controller(controller) = event.category else {
            return None;
        };
        let events = self.events(event.category)?;
        match events.previous(event.id).and_then(|id| events.get(id)) {
            Some(previous) => match previous.kind() {
                EventKind::ControllerChange(change) => Some(change.value),
                _ => None,
            },
            None => Some(registry.info_or_insert(controller).center()),
        }
    }

    /// The categories that are walked during playback, in playback order.
    pub fn playback_categories(&self) -> Vec<Category> {
        self.controllers
            .keys()
            .map(|controller| Category::Controller(*controller))
            .chain([Category::Tempos, Category::Notes])
            .collect()
    }

    /// The total number of events across all containers.
    pub fn event_count(&self) -> usize {
        self.notes.len()
            + self.tempos.len()
            + self.time_signatures.len()
            + self.meta.len()
            + self.controllers.values().map(|events| events.len()).sum::<usize>()
    }

    fn container_for(&mut self, category: Category) -> &mut OrderedEvents {
        match category {
            Category::Notes => &mut self.notes,
            Category::Tempos => &mut self.tempos,
            Category::TimeSignatures => &mut self.time_signatures,
            Category::Meta => &mut self.meta,
            Category::Controller(controller) => self.controllers.entry(controller).or_default(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (notes: {}, controllers: {}, events: {})",
            self.name,
            self.notes.len(),
            self.controllers.len(),
            self.event_count()
        )
    }
}

#[cfg(test)]
mod test {
    use midly::num::{u4, u7};

    use super::*;

    #[test]
    fn test_events_are_sorted_into_categories() {
        let mut track = Track::new();
        assert_eq!("<unnamed>", track.name());

        track.add_event(Event::note(0, u4::from(0), u7::from(60), u7::from(100), 96));
        track.add_event(Event::tempo(0, 120.0));
        track.add_event(Event::time_signature(0, 4, 4, 24, 8));
        track.add_event(Event::controller_change(
            0,
            u4::from(0),
            Controller::Continuous(7),
            100,
        ));
        track.add_event(Event::controller_change(
            10,
            u4::from(0),
            Controller::PitchBend,
            8192,
        ));
        track.add_event(Event::meta(0, 0x01, b"hello".to_vec()));

        assert_eq!(1, track.notes().len());
        assert_eq!(1, track.tempos().len());
        assert_eq!(1, track.time_signatures().len());
        assert_eq!(1, track.meta_events().len());
        assert!(track.has_controller(Controller::Continuous(7)));
        assert!(track.has_controller(Controller::PitchBend));
        assert!(!track.has_controller(Controller::ProgramChange));
        assert_eq!(6, track.event_count());

        assert_eq!(
            vec![
                Category::Controller(Controller::PitchBend),
                Category::Controller(Controller::Continuous(7)),
                Category::Tempos,
                Category::Notes,
            ],
            track.playback_categories()
        );
    }

    #[test]
    fn test_previous_value() {
        let mut registry = ControllerRegistry::new();
        let mut track = Track::new();
        let first = track.add_event(Event::controller_change(
            0,
            u4::from(0),
            Controller::PitchBend,
            100,
        ));
        let second = track.add_event(Event::controller_change(
            96,
            u4::from(0),
            Controller::PitchBend,
            9000,
        ));

        assert_eq!(Some(8192), track.previous_value(first, &mut registry));
        assert_eq!(Some(100), track.previous_value(second, &mut registry));

        let note = track.add_event(Event::note(0, u4::from(0), u7::from(1), u7::from(1), 1));
        assert_eq!(None, track.previous_value(note, &mut registry));
    }

    #[test]
    fn test_set_start_and_remove() {
        let mut track = Track::new();
        let a = track.add_event(Event::note(0, u4::from(0), u7::from(60), u7::from(100), 10));
        let b = track.add_event(Event::note(50, u4::from(0), u7::from(62), u7::from(100), 10));

        assert!(track.set_start(a, 100));
        assert_eq!(Some(b.id), track.notes().first());
        assert_eq!(Some(100), track.event(a).map(|event| event.start()));

        let removed = track.remove_event(b).expect("event should be removed");
        assert_eq!(50, removed.start());
        assert_eq!(1, track.notes().len());
        assert!(!track.set_start(b, 10));
    }

    #[test]
    fn test_push_event_rejects_out_of_order() {
        let mut track = Track::new();
        assert!(track.push_event(Event::tempo(100, 120.0)).is_ok());
        assert!(track.push_event(Event::tempo(50, 90.0)).is_err());
        // Other categories have their own tail.
        assert!(track.push_event(Event::time_signature(0, 3, 4, 24, 8)).is_ok());
    }

    #[test]
    fn test_device_controllers() {
        let mut registry = ControllerRegistry::new();
        let mut track = Track::new();
        track.add_event(Event::controller_change(
            0,
            u4::from(0),
            Controller::Continuous(0x4a),
            1,
        ));
        track.add_event(Event::controller_change(
            0,
            u4::from(0),
            Controller::Continuous(7),
            1,
        ));

        let controllers = track.device_controllers(&mut registry);
        assert_eq!(13, controllers.len());
        assert_eq!(Some(&Controller::Continuous(0x4a)), controllers.last());
    }
}
