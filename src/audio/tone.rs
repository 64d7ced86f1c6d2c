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


//! Fallback tones for triggers without custom clips.

use std::time::Duration;

use tracing::debug;

use super::automation::Automation;
use super::context::{ContextError, OutputContext, SourceHandle, SourceId, Voice};
use crate::trigger::ToneSpec;

/// Length of the attack ramp.
const ATTACK: Duration = Duration::from_millis(100);

/// The gain the decay ramps down to. Exponential ramps can't reach zero.
const DECAY_FLOOR: f32 = 0.001;

/// Allowed range for the tone level.
pub const TONE_LEVEL_RANGE: std::ops::RangeInclusive<f32> = 0.3..=0.5;

/// Produces sine tones on the shared context.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    level: f32,
}

impl ToneSynthesizer {
    /// Creates a synthesizer. The level scales the volume at the peak of the envelope and is
    /// clamped to 0.3..=0.5.
    pub fn new(level: f32) -> Self {
        Self {
            level: level.clamp(*TONE_LEVEL_RANGE.start(), *TONE_LEVEL_RANGE.end()),
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Creates a new, independent tone. Nothing sounds until it is started; the envelope is
    /// fixed from the volume given here.
    pub fn synthesize(&self, context: &OutputContext, spec: &ToneSpec, volume: f32) -> ToneHandle {
        let frequency = spec.frequency();
        let id = context.register(
            Voice::Sine {
                frequency,
                phase: 0.0,
            },
            Automation::new(0.0),
        );
        debug!(source = %id, frequency, duration_ms = spec.duration_ms, "Tone synthesized");
        ToneHandle {
            source: SourceHandle::new(context.clone(), id),
            frequency,
            peak: volume.clamp(0.0, 1.0) * self.level,
            duration: spec.duration(),
        }
    }
}

/// A generated tone: a sine oscillator and its gain envelope.
#[derive(Debug, Clone)]
pub struct ToneHandle {
    source: SourceHandle,
    frequency: f32,
    peak: f32,
    duration: Duration,
}

impl ToneHandle {
    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    /// The oscillator frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// The gain at the top of the attack.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Schedules the envelope from now, starts the oscillator and stops it when the decay ends.
    pub fn start(&self) -> Result<(), ContextError> {
        let context = self.source.context();
        let now = context.current_time();
        let end = now + self.duration.as_secs_f64();
        let (peak, id) = (self.peak, self.source.id());
        context.automate(id, |gain, _| {
            gain.set_value_at(0.0, now);
            gain.linear_ramp_to(peak, now + ATTACK.as_secs_f64());
            gain.exponential_ramp_to(DECAY_FLOOR, end);
        });
        context.start(id, now)?;
        context.stop_at(id, end);
        Ok(())
    }

    /// The current envelope gain, or None once the oscillator is gone.
    pub fn gain(&self) -> Option<f32> {
        self.source.gain()
    }

    /// Returns true while the oscillator is registered.
    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }

    /// When the oscillator stops.
    pub fn stop_time(&self) -> Option<f64> {
        self.source.stop_time()
    }

    /// Ramps the gain to zero and halts the oscillator when the ramp completes.
    pub fn fade_out(&self, duration: Duration) -> f64 {
        self.source.fade_out(duration)
    }

    /// Zeroes the gain and halts the oscillator.
    pub fn force_stop(&self) {
        self.source.force_stop()
    }

    /// Halts the oscillator with no fade.
    pub fn halt(&self) -> bool {
        self.source.halt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SourceEvent;
    use crate::trigger::Trigger;

    fn running_context() -> (OutputContext, crossbeam_channel::Receiver<SourceEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let context = OutputContext::new(1, 8000, tx);
        context.resume().unwrap();
        (context, rx)
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(ToneSynthesizer::new(0.9).level(), 0.5);
        assert_eq!(ToneSynthesizer::new(0.1).level(), 0.3);
        assert_eq!(ToneSynthesizer::new(0.4).level(), 0.4);
    }

    #[test]
    fn test_tone_parameters() {
        let (context, _rx) = running_context();
        let synth = ToneSynthesizer::new(0.5);
        let spec = Trigger::Goal.tones()[0];

        let tone = synth.synthesize(&context, &spec, 0.7);
        assert!((tone.frequency() - 528.0).abs() < 1e-3);
        assert!((tone.peak() - 0.35).abs() < 1e-6);
        assert_eq!(tone.duration(), Duration::from_millis(2000));
    }

    #[test]
    fn test_envelope() {
        let (context, rx) = running_context();
        let synth = ToneSynthesizer::new(0.5);
        let spec = Trigger::Save.tones()[0];
        let tone = synth.synthesize(&context, &spec, 1.0);

        // Silent until started.
        assert_eq!(tone.gain(), Some(0.0));
        context.render_for(Duration::from_millis(50));

        tone.start().unwrap();
        let started = context.current_time();
        assert_eq!(tone.stop_time(), Some(started + 1.0));

        context.render_for(Duration::from_millis(50));
        assert!((tone.gain().unwrap() - 0.25).abs() < 0.01);

        context.render_for(Duration::from_millis(50));
        assert!((tone.gain().unwrap() - 0.5).abs() < 0.01);

        context.render_for(Duration::from_millis(700));
        let late = tone.gain().unwrap();
        assert!(late > DECAY_FLOOR && late < 0.05);

        context.render_for(Duration::from_millis(250));
        assert_eq!(rx.try_recv(), Ok(SourceEvent::Ended(tone.id())));
        assert!(!tone.is_live());
    }

    #[test]
    fn test_fade_out_near_natural_end() {
        let (context, rx) = running_context();
        let synth = ToneSynthesizer::new(0.5);
        let spec = Trigger::Save.tones()[0];
        let tone = synth.synthesize(&context, &spec, 1.0);
        tone.start().unwrap();
        let natural = tone.stop_time().unwrap();

        context.render_for(Duration::from_millis(900));
        assert_eq!(tone.fade_out(Duration::from_millis(500)), natural);
        assert_eq!(tone.stop_time(), Some(natural));

        context.render_for(Duration::from_millis(110));
        assert_eq!(rx.try_recv(), Ok(SourceEvent::Ended(tone.id())));
    }

    #[test]
    fn test_each_call_is_independent() {
        let (context, _rx) = running_context();
        let synth = ToneSynthesizer::new(0.3);
        let spec = Trigger::Timeout.tones()[0];

        let first = synth.synthesize(&context, &spec, 1.0);
        let second = synth.synthesize(&context, &spec, 0.5);
        assert_ne!(first.id(), second.id());
        assert_eq!(context.source_count(), 2);

        first.start().unwrap();
        first.force_stop();
        assert!(!first.is_live());
        assert!(second.is_live());
    }
}
