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


//! Scheduled parameter curves on the output context's clock.
//!
//! An [`Automation`] holds a value that changes over audio time: immediate sets, linear ramps
//! and exponential ramps. A ramp starts at the previous event's time and value.

/// How the value moves towards an event.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Event {
    /// Audio time in seconds.
    time: f64,
    value: f32,
    curve: Curve,
}

/// A timeline of scheduled values.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    /// The value before any event applies.
    default: f32,
    /// Events ordered by time. Events at the same time keep insertion order.
    events: Vec<Event>,
}

impl Automation {
    /// Creates a timeline holding the given value.
    pub fn new(default: f32) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    /// Jumps to the value at the given time.
    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(Event {
            time,
            value,
            curve: Curve::Set,
        });
    }

    /// Ramps linearly from the previous event to the value, arriving at the given time.
    pub fn linear_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(Event {
            time,
            value,
            curve: Curve::Linear,
        });
    }

    /// Ramps exponentially from the previous event to the value, arriving at the given time.
    /// Both ends must be positive; otherwise the previous value is held until the event.
    pub fn exponential_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(Event {
            time,
            value,
            curve: Curve::Exponential,
        });
    }

    /// Removes every event at or after the given time.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|event| event.time < from);
    }

    /// Cancels events from the given time on and holds the value the curve had there.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let value = self.value_at(time);
        self.cancel_scheduled_values(time);
        self.set_value_at(value, time);
    }

    /// The time of the last scheduled event, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(|event| event.time)
    }

    /// The value at the given time.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev_time = 0.0;
        let mut prev_value = self.default;

        for event in &self.events {
            if event.time <= time {
                prev_time = event.time;
                prev_value = event.value;
                continue;
            }

            let span = event.time - prev_time;
            let progress = if span > 0.0 {
                ((time - prev_time) / span) as f32
            } else {
                1.0
            };
            return match event.curve {
                Curve::Set => prev_value,
                Curve::Linear => prev_value + (event.value - prev_value) * progress,
                Curve::Exponential if prev_value > 0.0 && event.value > 0.0 => {
                    prev_value * (event.value / prev_value).powf(progress)
                }
                Curve::Exponential => prev_value,
            };
        }

        prev_value
    }

    fn insert(&mut self, event: Event) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_default_value() {
        let automation = Automation::new(0.7);
        assert_eq!(automation.value_at(0.0), 0.7);
        assert_eq!(automation.value_at(10.0), 0.7);
        assert_eq!(automation.end_time(), None);
    }

    #[test]
    fn test_set_value() {
        let mut automation = Automation::new(1.0);
        automation.set_value_at(0.25, 2.0);
        assert_eq!(automation.value_at(1.9), 1.0);
        assert_eq!(automation.value_at(2.0), 0.25);
        assert_eq!(automation.value_at(5.0), 0.25);
    }

    #[test]
    fn test_linear_ramp() {
        let mut automation = Automation::new(0.0);
        automation.set_value_at(0.0, 1.0);
        automation.linear_ramp_to(0.5, 1.1);

        assert!(close(automation.value_at(1.05), 0.25));
        assert!(close(automation.value_at(1.1), 0.5));
        assert!(close(automation.value_at(3.0), 0.5));
    }

    #[test]
    fn test_exponential_ramp() {
        let mut automation = Automation::new(0.0);
        automation.set_value_at(1.0, 0.0);
        automation.exponential_ramp_to(0.01, 2.0);

        assert!(close(automation.value_at(1.0), 0.1));
        assert!(close(automation.value_at(2.0), 0.01));
    }

    #[test]
    fn test_exponential_ramp_from_zero_holds() {
        let mut automation = Automation::new(0.0);
        automation.exponential_ramp_to(0.5, 1.0);
        assert_eq!(automation.value_at(0.5), 0.0);
        assert_eq!(automation.value_at(1.0), 0.5);
    }

    #[test]
    fn test_cancel_and_hold() {
        let mut automation = Automation::new(0.0);
        automation.set_value_at(0.0, 0.0);
        automation.linear_ramp_to(1.0, 1.0);
        automation.exponential_ramp_to(0.001, 3.0);

        automation.cancel_and_hold(0.5);
        assert!(close(automation.value_at(0.5), 0.5));
        assert!(close(automation.value_at(2.0), 0.5));
        assert_eq!(automation.end_time(), Some(0.5));

        automation.linear_ramp_to(0.0, 1.0);
        assert!(close(automation.value_at(0.75), 0.25));
        assert_eq!(automation.value_at(1.0), 0.0);
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut automation = Automation::new(0.3);
        automation.set_value_at(0.6, 1.0);
        automation.set_value_at(0.9, 2.0);

        automation.cancel_scheduled_values(1.5);
        assert_eq!(automation.value_at(3.0), 0.6);

        automation.cancel_scheduled_values(0.0);
        assert_eq!(automation.value_at(3.0), 0.3);
    }
}
