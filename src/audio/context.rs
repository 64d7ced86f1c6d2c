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


//! The process-wide output context shared by generated tones and clips.
//!
//! The context owns a small mixer and an audio clock measured in rendered frames. A backend
//! (the device callback, or a test) pulls audio through [`OutputContext::render`]. Every
//! scheduled change (gain curves, starts and stops) is expressed in this clock, so a fade ends
//! exactly when its ramp does.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::automation::Automation;
use super::decode::DecodedAudio;

/// Global counter for source IDs.
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one sound on the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signals from the context to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// The source stopped producing sound on its own: it played out or reached its scheduled
    /// stop. Sources removed with `halt` don't report.
    Ended(SourceId),
}

/// The lifecycle of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Renders silence and the clock stands still.
    Suspended,
    Running,
    /// Permanently shut down. Nothing can be started any more.
    Closed,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("the audio context is closed")]
    Closed,

    #[error("source {0} is not known to the audio context")]
    UnknownSource(SourceId),
}

/// What a source plays.
pub(super) enum Voice {
    Sine { frequency: f32, phase: f32 },
    Clip { audio: Arc<DecodedAudio>, frame: usize },
}

struct Source {
    id: SourceId,
    voice: Voice,
    gain: Automation,
    /// None until started.
    start_at: Option<f64>,
    stop_at: Option<f64>,
}

struct Mixer {
    state: ContextState,
    frames_rendered: u64,
    sources: Vec<Source>,
    events: Sender<SourceEvent>,
}

/// A handle to the shared output context. Clones refer to the same context.
#[derive(Clone)]
pub struct OutputContext {
    mixer: Arc<Mutex<Mixer>>,
    channels: u16,
    sample_rate: u32,
}

impl OutputContext {
    /// Creates a suspended context. Ended sources are reported on `events`.
    pub fn new(channels: u16, sample_rate: u32, events: Sender<SourceEvent>) -> Self {
        info!(channels, sample_rate, "Audio context created");
        Self {
            mixer: Arc::new(Mutex::new(Mixer {
                state: ContextState::Suspended,
                frames_rendered: 0,
                sources: Vec::new(),
                events,
            })),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// The number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.mixer.lock().state
    }

    /// Starts the clock. A closed context can't be resumed.
    pub fn resume(&self) -> Result<(), ContextError> {
        let mut mixer = self.mixer.lock();
        match mixer.state {
            ContextState::Closed => Err(ContextError::Closed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                mixer.state = ContextState::Running;
                debug!("Audio context resumed");
                Ok(())
            }
        }
    }

    /// Stops the clock without dropping any sources.
    pub fn suspend(&self) {
        let mut mixer = self.mixer.lock();
        if mixer.state == ContextState::Running {
            mixer.state = ContextState::Suspended;
            debug!("Audio context suspended");
        }
    }

    /// Shuts the context down, dropping every source without reporting them.
    pub fn close(&self) {
        let mut mixer = self.mixer.lock();
        if mixer.state != ContextState::Closed {
            let dropped = mixer.sources.len();
            mixer.sources.clear();
            mixer.state = ContextState::Closed;
            info!(dropped, "Audio context closed");
        }
    }

    /// The audio clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.mixer.lock().frames_rendered as f64 / self.sample_rate as f64
    }

    /// The number of sources that are registered, started or not.
    pub fn source_count(&self) -> usize {
        self.mixer.lock().sources.len()
    }

    /// Returns true if the source is still registered.
    pub fn is_live(&self, id: SourceId) -> bool {
        self.mixer.lock().sources.iter().any(|source| source.id == id)
    }

    /// Mixes the next block of interleaved output into `out`.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let mut mixer = self.mixer.lock();
        if mixer.state != ContextState::Running {
            return;
        }

        let channels = self.channels as usize;
        let frames = out.len() / channels;
        let rate = self.sample_rate as f64;
        let first_frame = mixer.frames_rendered;
        let mut ended = Vec::new();

        for source in mixer.sources.iter_mut() {
            let Some(start_at) = source.start_at else {
                continue;
            };

            for frame in 0..frames {
                let time = (first_frame + frame as u64) as f64 / rate;
                if time < start_at {
                    continue;
                }
                if source.stop_at.is_some_and(|stop_at| time >= stop_at) {
                    ended.push(source.id);
                    break;
                }

                let gain = source.gain.value_at(time);
                let out_frame = &mut out[frame * channels..(frame + 1) * channels];
                match &mut source.voice {
                    Voice::Sine { frequency, phase } => {
                        let sample = phase.sin() * gain;
                        for out_sample in out_frame.iter_mut() {
                            *out_sample += sample;
                        }
                        *phase = (*phase + TAU * *frequency / self.sample_rate as f32) % TAU;
                    }
                    Voice::Clip { audio, frame: position } => {
                        if *position >= audio.frames() {
                            ended.push(source.id);
                            break;
                        }
                        for (channel, out_sample) in out_frame.iter_mut().enumerate() {
                            *out_sample += audio.sample(*position, channel) * gain;
                        }
                        *position += 1;
                    }
                }
            }
        }

        mixer.frames_rendered += frames as u64;
        if !ended.is_empty() {
            mixer.sources.retain(|source| !ended.contains(&source.id));
            for id in ended {
                debug!(source = %id, "Source ended");
                // The owner may be gone during shutdown.
                let _ = mixer.events.send(SourceEvent::Ended(id));
            }
        }
    }

    /// Renders and discards the given amount of audio. Advances the clock only while running.
    pub fn render_for(&self, duration: Duration) {
        let mut frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let mut buffer = vec![0.0f32; 512 * self.channels as usize];
        while frames > 0 {
            let block = frames.min(512);
            self.render(&mut buffer[..block * self.channels as usize]);
            frames -= block;
        }
    }

    pub(super) fn register(&self, voice: Voice, gain: Automation) -> SourceId {
        let id = SourceId::next();
        self.mixer.lock().sources.push(Source {
            id,
            voice,
            gain,
            start_at: None,
            stop_at: None,
        });
        id
    }

    /// Starts a source at the given time, or now if that has passed. Starting a source on a
    /// closed context drops it.
    pub(super) fn start(&self, id: SourceId, when: f64) -> Result<(), ContextError> {
        let mut mixer = self.mixer.lock();
        if mixer.state == ContextState::Closed {
            mixer.sources.retain(|source| source.id != id);
            return Err(ContextError::Closed);
        }
        let now = mixer.frames_rendered as f64 / self.sample_rate as f64;
        let source = mixer
            .sources
            .iter_mut()
            .find(|source| source.id == id)
            .ok_or(ContextError::UnknownSource(id))?;
        source.start_at = Some(when.max(now));
        Ok(())
    }

    /// Schedules a source to stop at the given time. The stop is reported as `Ended`.
    pub(super) fn stop_at(&self, id: SourceId, when: f64) {
        if let Some(source) = self.mixer.lock().sources.iter_mut().find(|s| s.id == id) {
            source.stop_at = Some(when);
        }
    }

    /// Applies a change to a source's gain curve.
    pub(super) fn automate(&self, id: SourceId, f: impl FnOnce(&mut Automation, f64)) {
        let mut mixer = self.mixer.lock();
        let now = mixer.frames_rendered as f64 / self.sample_rate as f64;
        if let Some(source) = mixer.sources.iter_mut().find(|s| s.id == id) {
            f(&mut source.gain, now);
        }
    }

    /// The source's gain at the current time.
    pub(super) fn gain(&self, id: SourceId) -> Option<f32> {
        let mixer = self.mixer.lock();
        let now = mixer.frames_rendered as f64 / self.sample_rate as f64;
        mixer
            .sources
            .iter()
            .find(|s| s.id == id)
            .map(|source| source.gain.value_at(now))
    }

    /// The scheduled stop of a source.
    pub(super) fn stop_time(&self, id: SourceId) -> Option<f64> {
        self.mixer
            .lock()
            .sources
            .iter()
            .find(|s| s.id == id)
            .and_then(|source| source.stop_at)
    }

    /// Removes a source immediately, without reporting it.
    pub(super) fn remove(&self, id: SourceId) -> bool {
        let mut mixer = self.mixer.lock();
        let before = mixer.sources.len();
        mixer.sources.retain(|source| source.id != id);
        mixer.sources.len() != before
    }
}

impl std::fmt::Debug for OutputContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mixer = self.mixer.lock();
        f.debug_struct("OutputContext")
            .field("state", &mixer.state)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames_rendered", &mixer.frames_rendered)
            .field("sources", &mixer.sources.len())
            .finish()
    }
}

/// Operations shared by every kind of playing sound.
#[derive(Clone, Debug)]
pub struct SourceHandle {
    id: SourceId,
    context: OutputContext,
}

impl SourceHandle {
    pub(super) fn new(context: OutputContext, id: SourceId) -> Self {
        Self { id, context }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn context(&self) -> &OutputContext {
        &self.context
    }

    /// Starts producing sound now.
    pub fn start(&self) -> Result<(), ContextError> {
        self.context.start(self.id, self.context.current_time())
    }

    /// Returns true while the source is registered with the context.
    pub fn is_live(&self) -> bool {
        self.context.is_live(self.id)
    }

    /// The current gain, or None once the source is gone.
    pub fn gain(&self) -> Option<f32> {
        self.context.gain(self.id)
    }

    /// When the source is scheduled to stop, if at all.
    pub fn stop_time(&self) -> Option<f64> {
        self.context.stop_time(self.id)
    }

    /// Ramps the gain to zero over `duration` from the current value and stops the source
    /// when the ramp completes, or at its earlier scheduled stop. Returns the stop time.
    pub fn fade_out(&self, duration: Duration) -> f64 {
        let mut end = 0.0;
        self.context.automate(self.id, |gain, now| {
            end = now + duration.as_secs_f64();
            gain.cancel_and_hold(now);
            gain.linear_ramp_to(0.0, end);
        });
        let stop = self
            .context
            .stop_time(self.id)
            .map_or(end, |scheduled| scheduled.min(end));
        self.context.stop_at(self.id, stop);
        stop
    }

    /// Silences and removes the source right away.
    pub fn force_stop(&self) {
        self.context.automate(self.id, |gain, now| {
            gain.cancel_scheduled_values(0.0);
            gain.set_value_at(0.0, now);
        });
        self.halt();
    }

    /// Removes the source right away. No `Ended` event follows.
    pub fn halt(&self) -> bool {
        self.context.remove(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (OutputContext, crossbeam_channel::Receiver<SourceEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (OutputContext::new(2, 1000, tx), rx)
    }

    fn clip(context: &OutputContext, samples: Vec<f32>) -> SourceHandle {
        let audio = Arc::new(DecodedAudio::new(samples, 1, context.sample_rate()));
        let id = context.register(Voice::Clip { audio, frame: 0 }, Automation::new(1.0));
        SourceHandle::new(context.clone(), id)
    }

    #[test]
    fn test_starts_suspended() {
        let (context, _rx) = context();
        assert_eq!(context.state(), ContextState::Suspended);

        let handle = clip(&context, vec![0.5; 10]);
        handle.start().unwrap();

        let mut out = vec![1.0; 8];
        context.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(context.current_time(), 0.0);

        context.resume().unwrap();
        context.render(&mut out);
        assert_eq!(out, vec![0.5; 8]);
        assert_eq!(context.current_time(), 0.004);
    }

    #[test]
    fn test_clip_end_is_reported() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.25; 3]);
        handle.start().unwrap();

        let mut out = vec![0.0; 10];
        context.render(&mut out);
        assert_eq!(&out[..6], &[0.25; 6]);
        assert_eq!(&out[6..], &[0.0; 4]);
        assert_eq!(rx.try_recv(), Ok(SourceEvent::Ended(handle.id())));
        assert!(!handle.is_live());
    }

    #[test]
    fn test_unstarted_sources_are_silent() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.25; 3]);

        context.render_for(Duration::from_millis(100));
        assert!(handle.is_live());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_halt_is_silent() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.25; 1000]);
        handle.start().unwrap();

        assert!(handle.halt());
        assert!(!handle.halt());
        context.render_for(Duration::from_millis(10));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fade_out_stops_when_ramp_completes() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.5; 5000]);
        handle.start().unwrap();
        context.render_for(Duration::from_millis(100));

        let end = handle.fade_out(Duration::from_millis(500));
        assert!((end - 0.6).abs() < 1e-9);
        assert_eq!(handle.stop_time(), Some(end));

        context.render_for(Duration::from_millis(250));
        let gain = handle.gain().unwrap();
        assert!((gain - 0.5).abs() < 0.01);
        assert!(rx.try_recv().is_err());

        context.render_for(Duration::from_millis(260));
        assert_eq!(rx.try_recv(), Ok(SourceEvent::Ended(handle.id())));
        assert!(!handle.is_live());
    }

    #[test]
    fn test_fade_out_keeps_earlier_stop() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.5; 5000]);
        handle.start().unwrap();
        context.stop_at(handle.id(), 1.0);
        context.render_for(Duration::from_millis(900));

        let stop = handle.fade_out(Duration::from_millis(500));
        assert_eq!(stop, 1.0);
        assert_eq!(handle.stop_time(), Some(1.0));

        context.render_for(Duration::from_millis(110));
        assert_eq!(rx.try_recv(), Ok(SourceEvent::Ended(handle.id())));
        assert!(!handle.is_live());
    }

    #[test]
    fn test_force_stop() {
        let (context, rx) = context();
        context.resume().unwrap();
        let handle = clip(&context, vec![0.5; 5000]);
        handle.start().unwrap();
        handle.fade_out(Duration::from_millis(500));

        handle.force_stop();
        assert!(!handle.is_live());
        assert_eq!(handle.gain(), None);
        context.render_for(Duration::from_millis(600));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_context_refuses_start() {
        let (context, _rx) = context();
        context.resume().unwrap();
        let playing = clip(&context, vec![0.5; 5000]);
        playing.start().unwrap();

        context.close();
        assert_eq!(context.state(), ContextState::Closed);
        assert!(!playing.is_live());
        assert_eq!(context.resume(), Err(ContextError::Closed));

        let handle = clip(&context, vec![0.5; 10]);
        assert_eq!(handle.start(), Err(ContextError::Closed));
        assert_eq!(context.source_count(), 0);
    }

    #[test]
    fn test_sine_voice() {
        let (context, _rx) = context();
        context.resume().unwrap();
        let id = context.register(
            Voice::Sine {
                frequency: 250.0,
                phase: 0.0,
            },
            Automation::new(1.0),
        );
        context.start(id, 0.0).unwrap();

        let mut out = vec![0.0; 8];
        context.render(&mut out);
        // A quarter period per frame at 250 Hz / 1000 Hz.
        assert!(out[0].abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-5);
        assert!((out[3] - 1.0).abs() < 1e-5);
        assert!(out[4].abs() < 1e-5);
        assert!((out[6] + 1.0).abs() < 1e-5);
    }
}
