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


//! Cancelable deadlines keyed by identity.
//!
//! Nothing here sleeps. The event loop asks for the next deadline, waits until then and
//! collects whatever is due. Callers pass `now` in, which keeps timing deterministic in tests.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// At most one pending deadline per key.
#[derive(Debug, Clone)]
pub struct Timers<K> {
    deadlines: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Timers<K> {
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }

    /// Schedules the key, replacing any deadline it already had. Returns true if one was
    /// replaced.
    pub fn schedule(&mut self, key: K, at: Instant) -> bool {
        self.deadlines.insert(key, at).is_some()
    }

    /// Cancels the key's deadline. Returns true if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Cancels everything, returning how many deadlines were pending.
    pub fn cancel_all(&mut self) -> usize {
        let pending = self.deadlines.len();
        self.deadlines.clear();
        pending
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    /// Removes and returns every key due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(Instant, K)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, key.clone()))
            .collect();
        due.sort_by_key(|(at, _)| *at);

        for (_, key) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for Timers<K> {
    fn default() -> Self {
        Self::new()
    }
}
