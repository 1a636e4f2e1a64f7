//! The `Controller`-owned event arena.
//!
//! Events are shared between `Graph`s and `Table`s via retain counts in the
//! original design; here they live in a single arena and every owner (a
//! `Graph` or `Table` instance) tracks its own live-set of referenced
//! `EventId`s. An event is only ever destroyed once no owner's live-set
//! contains it any more — the same "destroyed when the last reference goes
//! away" guarantee as a retain counter, without scattering raw pointers.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::event::Event;

pub type EventId = u64;

/// Identifies whichever `Graph` or `Table` is holding a live reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

#[derive(Default)]
struct ArenaState {
    events: HashMap<EventId, Event>,
    ref_counts: HashMap<EventId, u32>,
    live_sets: HashMap<OwnerId, HashSet<EventId>>,
}

/// Owns every live `Event`; `Track`/`Graph`/`Table` only ever hold `EventId`s.
#[derive(Default)]
pub struct EventArena {
    state: Mutex<ArenaState>,
}

impl EventArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly-parsed event, keyed by its own `id` field, with
    /// zero live references. The caller must `retain` it from some owner or
    /// it is never observable again (insert does not itself keep it alive).
    /// Re-inserting an id already present overwrites the stored event but
    /// leaves its ref count untouched.
    pub fn insert(&self, event: Event) -> EventId {
        let mut state = self.state.lock().expect("arena poisoned");
        let id = event.id;
        state.ref_counts.entry(id).or_insert(0);
        state.events.insert(id, event);
        id
    }

    pub fn get(&self, id: EventId) -> Option<Event> {
        self.state.lock().expect("arena poisoned").events.get(&id).cloned()
    }

    pub fn with_event<R>(&self, id: EventId, f: impl FnOnce(&Event) -> R) -> Option<R> {
        self.state
            .lock()
            .expect("arena poisoned")
            .events
            .get(&id)
            .map(f)
    }

    /// Registers `id` into `owner`'s live set, incrementing the shared
    /// reference count the first time this owner sees it (idempotent per
    /// owner, mirroring "one increment per placement").
    pub fn retain(&self, owner: OwnerId, id: EventId) {
        let mut state = self.state.lock().expect("arena poisoned");
        let newly_inserted = state.live_sets.entry(owner).or_default().insert(id);
        if newly_inserted {
            *state.ref_counts.entry(id).or_insert(0) += 1;
        }
    }

    /// Releases every event `owner` holds, destroying any that drop to zero
    /// references ("one decrement per release").
    pub fn release_owner(&self, owner: OwnerId) {
        let mut state = self.state.lock().expect("arena poisoned");
        let Some(ids) = state.live_sets.remove(&owner) else {
            return;
        };
        for id in ids {
            if let Some(count) = state.ref_counts.get_mut(&id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.ref_counts.remove(&id);
                    state.events.remove(&id);
                }
            }
        }
    }

    pub fn retain_count(&self, id: EventId) -> u32 {
        self.state
            .lock()
            .expect("arena poisoned")
            .ref_counts
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_alive(&self, id: EventId) -> bool {
        self.state.lock().expect("arena poisoned").events.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("arena poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_usage(&self) -> u64 {
        let state = self.state.lock().expect("arena poisoned");
        (state.events.len() * std::mem::size_of::<Event>()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn sample_event(id: u64) -> Event {
        Event::new_leaf(id, 0, 10, 0, 0, 0)
    }

    #[test]
    fn event_destroyed_when_last_owner_releases() {
        let arena = EventArena::new();
        let id = arena.insert(sample_event(1));
        let graph_owner = OwnerId(1);
        let table_owner = OwnerId(2);
        arena.retain(graph_owner, id);
        arena.retain(table_owner, id);
        assert_eq!(arena.retain_count(id), 2);

        arena.release_owner(graph_owner);
        assert!(arena.is_alive(id));
        assert_eq!(arena.retain_count(id), 1);

        arena.release_owner(table_owner);
        assert!(!arena.is_alive(id));
        assert_eq!(arena.retain_count(id), 0);
    }

    #[test]
    fn retaining_same_event_twice_from_one_owner_does_not_double_count() {
        let arena = EventArena::new();
        let id = arena.insert(sample_event(1));
        let owner = OwnerId(1);
        arena.retain(owner, id);
        arena.retain(owner, id);
        assert_eq!(arena.retain_count(id), 1);
    }
}
