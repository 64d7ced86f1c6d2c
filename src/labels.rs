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


//! Transient label feedback on trigger controls.
//!
//! Starting a sound shows its name on the trigger's control and marks it active. The text goes
//! back to the control's original label after a short window, or right away when the sound
//! stops. The active mark only clears on stop.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::timer::Timers;
use crate::trigger::Trigger;

/// An on-screen control bound to one trigger.
pub trait Control: Send {
    /// The text currently displayed.
    fn label(&self) -> String;

    /// Replaces the displayed text.
    fn set_label(&mut self, text: &str);

    /// Marks the control as playing or not.
    fn set_active(&mut self, active: bool);
}

/// Drives the labels of every bound control.
pub struct LabelController {
    controls: BTreeMap<Trigger, Box<dyn Control>>,
    /// Labels as first seen, captured the first time a control shows feedback.
    originals: BTreeMap<Trigger, String>,
    active: BTreeSet<Trigger>,
    restores: Timers<Trigger>,
    restore_after: Duration,
}

impl LabelController {
    /// Creates a controller restoring labels after the given window.
    pub fn new(restore_after: Duration) -> Self {
        Self {
            controls: BTreeMap::new(),
            originals: BTreeMap::new(),
            active: BTreeSet::new(),
            restores: Timers::new(),
            restore_after,
        }
    }

    /// Binds a control to a trigger, replacing any previous one.
    pub fn bind(&mut self, trigger: Trigger, control: Box<dyn Control>) {
        self.originals.remove(&trigger);
        self.active.remove(&trigger);
        self.restores.cancel(&trigger);
        self.controls.insert(trigger, control);
    }

    /// Shows the transient label and marks the control active.
    pub fn on_start(&mut self, trigger: Trigger, label: &str, now: Instant) {
        let Some(control) = self.controls.get_mut(&trigger) else {
            trace!(trigger = %trigger, "No control bound");
            return;
        };

        self.originals
            .entry(trigger)
            .or_insert_with(|| control.label());
        control.set_label(label);
        control.set_active(true);
        self.active.insert(trigger);
        self.restores.schedule(trigger, now + self.restore_after);
        debug!(trigger = %trigger, label, "Label shown");
    }

    /// Restores the original label and clears the active mark.
    pub fn on_stop(&mut self, trigger: Trigger) {
        self.restores.cancel(&trigger);
        self.active.remove(&trigger);
        if let Some(control) = self.controls.get_mut(&trigger) {
            if let Some(original) = self.originals.get(&trigger) {
                control.set_label(original);
            }
            control.set_active(false);
        }
    }

    /// Restores every control that has shown feedback and cancels all pending restores.
    pub fn restore_all(&mut self) {
        self.restores.cancel_all();
        self.active.clear();
        for (trigger, original) in &self.originals {
            if let Some(control) = self.controls.get_mut(trigger) {
                control.set_label(original);
                control.set_active(false);
            }
        }
    }

    /// Restores the text of controls whose window has passed. Returns how many were restored.
    pub fn poll(&mut self, now: Instant) -> usize {
        let due = self.restores.take_due(now);
        for trigger in &due {
            if let (Some(control), Some(original)) =
                (self.controls.get_mut(trigger), self.originals.get(trigger))
            {
                control.set_label(original);
                trace!(trigger = %trigger, "Label restored");
            }
        }
        due.len()
    }

    /// When the next pending restore is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.restores.next_deadline()
    }

    /// The recorded original label of a trigger's control.
    pub fn original(&self, trigger: Trigger) -> Option<&str> {
        self.originals.get(&trigger).map(String::as_str)
    }

    /// Triggers whose controls are marked active.
    pub fn active(&self) -> impl Iterator<Item = Trigger> + '_ {
        self.active.iter().copied()
    }

    pub fn is_active(&self, trigger: Trigger) -> bool {
        self.active.contains(&trigger)
    }
}

impl std::fmt::Debug for LabelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelController")
            .field("controls", &self.controls.keys().collect::<Vec<_>>())
            .field("originals", &self.originals)
            .field("active", &self.active)
            .field("pending", &self.restores.len())
            .finish()
    }
}
