// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cycle scheduler
//!
//! The [`Scheduler`] owns the only clock of a session: a monotonically
//! increasing count of CPU cycles. Components that need to run at a specific
//! cycle (a DMA slice, a scanline boundary) register a named event and keep it
//! scheduled; the system loop never advances past the earliest due event
//! without servicing it first.
//!
//! ```text
//! now                     instruction end
//!  │                             │
//!  ├────────┬───────────┬────────┤
//!  │ slice  │  slice    │ slice  │
//!  │        ▲           ▲        │
//!  │     DMA slice   hblank      │
//! ```
//!
//! # Example
//!
//! ```
//! use psrx_core::core::timing::Scheduler;
//!
//! let mut scheduler = Scheduler::new();
//! let hblank = scheduler.register_event("hblank");
//! scheduler.schedule(hblank, 100);
//!
//! assert_eq!(scheduler.next_boundary(250), 100);
//! scheduler.advance_to(100);
//! assert_eq!(scheduler.take_due_events(), vec![hblank]);
//! assert_eq!(scheduler.next_boundary(250), 250);
//! ```

use serde::{Deserialize, Serialize};

/// Handle to a registered event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHandle(usize);

impl EventHandle {
    /// Registration index of the event
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TimingEvent {
    name: String,
    /// Absolute cycle the event is due at, `None` while inactive
    due: Option<u64>,
}

/// Session clock and event queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    /// Cycles elapsed since the session was created
    global_tick_counter: u64,

    events: Vec<TimingEvent>,
}

impl Scheduler {
    /// Create a scheduler at cycle 0 with no events
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cycle
    #[inline(always)]
    pub fn global_tick_counter(&self) -> u64 {
        self.global_tick_counter
    }

    /// Register a new, inactive event
    pub fn register_event(&mut self, name: &str) -> EventHandle {
        self.events.push(TimingEvent {
            name: name.to_string(),
            due: None,
        });
        log::trace!("Registered timing event '{}'", name);
        EventHandle(self.events.len() - 1)
    }

    /// Name an event was registered with
    pub fn event_name(&self, handle: EventHandle) -> &str {
        self.events
            .get(handle.0)
            .map(|event| event.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Schedule `handle` to fire `cycles` from now, replacing any earlier schedule
    pub fn schedule(&mut self, handle: EventHandle, cycles: u64) {
        let due = self.global_tick_counter.saturating_add(cycles);
        self.schedule_at(handle, due);
    }

    /// Schedule `handle` at an absolute cycle
    ///
    /// A cycle in the past is clamped to now: events never fire backwards.
    pub fn schedule_at(&mut self, handle: EventHandle, cycle: u64) {
        let due = cycle.max(self.global_tick_counter);
        if let Some(event) = self.events.get_mut(handle.0) {
            event.due = Some(due);
        }
    }

    /// Cancel `handle`
    pub fn deactivate(&mut self, handle: EventHandle) {
        if let Some(event) = self.events.get_mut(handle.0) {
            event.due = None;
        }
    }

    /// Cancel every event
    pub fn deactivate_all(&mut self) {
        for event in &mut self.events {
            event.due = None;
        }
    }

    /// Whether `handle` is currently scheduled
    pub fn is_active(&self, handle: EventHandle) -> bool {
        self.due_at(handle).is_some()
    }

    /// Absolute cycle `handle` is due at
    pub fn due_at(&self, handle: EventHandle) -> Option<u64> {
        self.events.get(handle.0).and_then(|event| event.due)
    }

    /// Earliest of `limit` and every active event's due cycle
    pub fn next_boundary(&self, limit: u64) -> u64 {
        self.events
            .iter()
            .filter_map(|event| event.due)
            .fold(limit, u64::min)
    }

    /// Move the clock forward to `cycle`
    ///
    /// The clock never moves backwards; an earlier cycle is ignored.
    pub fn advance_to(&mut self, cycle: u64) {
        if cycle < self.global_tick_counter {
            log::warn!(
                "Ignoring backwards clock move {} -> {}",
                self.global_tick_counter,
                cycle
            );
            return;
        }
        self.global_tick_counter = cycle;
    }

    /// Deactivate and return every event due at or before now
    ///
    /// Events come out ordered by due cycle, then registration order.
    pub fn take_due_events(&mut self) -> Vec<EventHandle> {
        let now = self.global_tick_counter;
        let mut due: Vec<(u64, usize)> = self
            .events
            .iter()
            .enumerate()
            .filter_map(|(index, event)| event.due.filter(|&cycle| cycle <= now).map(|c| (c, index)))
            .collect();
        due.sort_unstable();

        for &(_, index) in &due {
            self.events[index].due = None;
        }
        due.into_iter().map(|(_, index)| EventHandle(index)).collect()
    }

    /// Number of registered events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
