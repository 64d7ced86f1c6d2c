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

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use super::entry::{EntryId, PlaybackEntry, PlaybackHandle, PlaybackState};
use crate::audio::{
    self, AudioOutput, ClipHandle, ContextState, DecodedAudio, OutputContext, SourceEvent,
    ToneSynthesizer,
};
use crate::error::SoundboardError;
use crate::labels::LabelController;
use crate::library::{BatchUpload, ClipId, CustomClip, Persisted, SoundLibrary, Upload};
use crate::status::{Status, StatusProjector};
use crate::trigger::Trigger;

/// Tunables of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Initial volume.
    pub volume: f32,
    /// Peak level of generated tones.
    pub tone_level: f32,
    /// Length of the graceful stop fade.
    pub fade_out: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            volume: 0.7,
            tone_level: 0.5,
            fade_out: Duration::from_millis(500),
        }
    }
}

/// Decides what plays, tracks what is playing and keeps labels and status in step with it.
pub struct PlaybackCoordinator {
    library: SoundLibrary,
    labels: LabelController,
    status: StatusProjector,
    output: AudioOutput,
    synth: ToneSynthesizer,
    state: PlaybackState,
    /// Entries stopped gracefully whose fades haven't completed. Not part of the state.
    fading: Vec<PlaybackEntry>,
    rng: StdRng,
    fade_out: Duration,
}

impl PlaybackCoordinator {
    pub fn new(
        library: SoundLibrary,
        labels: LabelController,
        status: StatusProjector,
        output: AudioOutput,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            library,
            labels,
            status,
            output,
            synth: ToneSynthesizer::new(options.tone_level),
            state: PlaybackState::new(options.volume),
            fading: Vec::new(),
            rng: StdRng::from_entropy(),
            fade_out: options.fade_out,
        }
    }

    /// Replaces the random source used for clip and tone selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Plays a trigger: one of its clips picked at random, or its fallback tone. Anything
    /// playing is stopped first, without a fade.
    pub fn activate(&mut self, trigger: Trigger, now: Instant) -> Result<EntryId, SoundboardError> {
        if !self.state.is_idle() || !self.fading.is_empty() {
            debug!(trigger = %trigger, "Preempting active sounds");
            self.stop_all_sounds_immediately();
        }

        match self.library.choose(trigger, &mut self.rng).cloned() {
            Some(clip) => self.start_clip(trigger, &clip, Some(trigger), now),
            None => self.start_tone(trigger, now),
        }
    }

    /// Plays one named clip of a trigger alongside whatever is playing. Previews have no
    /// control and show no label feedback.
    pub fn preview(
        &mut self,
        trigger: Trigger,
        name: &str,
        now: Instant,
    ) -> Result<EntryId, SoundboardError> {
        let clip = self
            .library
            .find(trigger, name)
            .cloned()
            .ok_or_else(|| SoundboardError::ClipNotFound {
                trigger,
                name: name.to_string(),
            })?;
        self.start_clip(trigger, &clip, None, now)
    }

    fn start_clip(
        &mut self,
        trigger: Trigger,
        clip: &CustomClip,
        control: Option<Trigger>,
        now: Instant,
    ) -> Result<EntryId, SoundboardError> {
        if let Some(control) = control {
            self.labels.on_start(control, clip.name(), now);
        }

        let handle = match self.prepare_clip(clip) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(trigger = %trigger, clip = clip.name(), err = %e, "Unable to prepare clip");
                self.roll_back(control);
                return Err(e);
            }
        };

        // Registered before starting so a failed start can be rolled back.
        let entry = PlaybackEntry::new(
            trigger,
            PlaybackHandle::Clip(handle.clone()),
            control,
            clip.name(),
        );
        let id = entry.id();
        self.state.push(entry);

        if let Err(e) = handle.play() {
            self.state.remove(id);
            self.roll_back(control);
            warn!(trigger = %trigger, clip = clip.name(), err = %e, "Clip refused to start");
            return Err(SoundboardError::PlaybackStart {
                name: clip.name().to_string(),
                reason: e.to_string(),
            });
        }

        info!(
            trigger = %trigger,
            clip = clip.name(),
            entry = %id,
            preview = control.is_none(),
            "Clip started"
        );
        self.publish();
        Ok(id)
    }

    /// Builds a clip handle, decoding on the spot if the cache is cold.
    fn prepare_clip(&mut self, clip: &CustomClip) -> Result<ClipHandle, SoundboardError> {
        let context = self.output.context()?.clone();
        let audio = match self.library.playable(clip.id()) {
            Some(audio) => audio,
            None => {
                debug!(clip = clip.name(), "Decoding clip on demand");
                let audio = Arc::new(audio::decode(
                    clip.name(),
                    clip.bytes(),
                    context.sample_rate(),
                )?);
                self.library.cache_playable(clip.id(), audio.clone());
                audio
            }
        };
        Ok(ClipHandle::new(&context, audio, self.state.volume()))
    }

    fn start_tone(&mut self, trigger: Trigger, now: Instant) -> Result<EntryId, SoundboardError> {
        let spec = trigger
            .tones()
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| SoundboardError::PlaybackStart {
                name: trigger.key().to_string(),
                reason: "no tone defined".to_string(),
            })?;
        self.labels.on_start(trigger, spec.text, now);

        let context = match self.output.context() {
            Ok(context) => context.clone(),
            Err(e) => {
                warn!(trigger = %trigger, err = %e, "Unable to open output for tone");
                self.roll_back(Some(trigger));
                return Err(e);
            }
        };

        let tone = self.synth.synthesize(&context, &spec, self.state.volume());
        let entry = PlaybackEntry::new(
            trigger,
            PlaybackHandle::Tone(tone.clone()),
            Some(trigger),
            spec.text,
        );
        let id = entry.id();
        self.state.push(entry);

        if let Err(e) = tone.start() {
            self.state.remove(id);
            tone.halt();
            self.roll_back(Some(trigger));
            warn!(trigger = %trigger, err = %e, "Tone refused to start");
            return Err(SoundboardError::PlaybackStart {
                name: spec.text.to_string(),
                reason: e.to_string(),
            });
        }

        info!(
            trigger = %trigger,
            frequency = tone.frequency(),
            duration_ms = spec.duration_ms,
            entry = %id,
            "Tone started"
        );
        self.publish();
        Ok(id)
    }

    /// Undoes the label change of a failed start.
    fn roll_back(&mut self, control: Option<Trigger>) {
        if let Some(control) = control {
            if !self.state.has_control(control) {
                self.labels.on_stop(control);
            }
        }
        self.publish();
    }

    /// Handles a sound that stopped on its own. Returns true if it ended an active entry;
    /// events for sounds that are no longer tracked are ignored.
    pub fn handle_source_event(&mut self, event: SourceEvent) -> bool {
        let SourceEvent::Ended(source) = event;

        if let Some(entry) = self.state.remove_source(source) {
            info!(trigger = %entry.trigger(), entry = %entry.id(), "Playback ended");
            if let Some(control) = entry.control() {
                if !self.state.has_control(control) {
                    self.labels.on_stop(control);
                }
            }
            self.publish();
            return true;
        }

        if let Some(index) = self
            .fading
            .iter()
            .position(|entry| entry.handle().source_id() == source)
        {
            let entry = self.fading.remove(index);
            debug!(trigger = %entry.trigger(), entry = %entry.id(), "Fade finished");
            return false;
        }

        trace!(source = %source, "Ignoring event for untracked source");
        false
    }

    /// Graceful stop: every entry fades out and is paused or halted when the fade completes.
    /// The state and labels clear right away.
    pub fn stop_all_sounds(&mut self) {
        let entries = self.state.take_all();
        info!(
            entries = entries.len(),
            fade_ms = self.fade_out.as_millis() as u64,
            "Stopping all sounds"
        );
        for entry in entries {
            entry.handle().fade_out(self.fade_out);
            self.fading.push(entry);
        }
        self.labels.restore_all();
        self.publish();
    }

    /// Immediate stop: every sound, fading ones included, is halted with no fade.
    pub fn stop_all_sounds_immediately(&mut self) {
        let entries = self.state.take_all();
        debug!(
            entries = entries.len(),
            fading = self.fading.len(),
            "Stopping all sounds immediately"
        );
        for entry in entries.iter().chain(self.fading.iter()) {
            entry.handle().halt();
        }
        self.fading.clear();
        self.labels.restore_all();
        self.publish();
    }

    /// Force stop: every sound, fading ones included, is muted and halted on the spot.
    pub fn force_stop_all_sounds(&mut self) {
        let entries = self.state.take_all();
        info!(
            entries = entries.len(),
            fading = self.fading.len(),
            "Force stopping all sounds"
        );
        for entry in entries.iter().chain(self.fading.iter()) {
            entry.handle().force_stop();
        }
        self.fading.clear();
        self.labels.restore_all();
        self.publish();
    }

    /// Sets the volume. Playing clips follow right away; tones pick it up on their next play.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = self.state.set_volume(volume);
        let live = self
            .state
            .entries()
            .iter()
            .filter(|entry| entry.handle().set_volume(volume))
            .count();
        debug!(volume, live, "Volume changed");
        volume
    }

    /// Restores labels whose window has passed.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        self.labels.poll(now)
    }

    /// When `poll_timers` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.labels.next_deadline()
    }

    /// Adds a clip to the library.
    pub fn add_clip(&mut self, upload: Upload) -> Result<Persisted<ClipId>, SoundboardError> {
        let result = self.library.add_clip(upload);
        self.publish();
        result
    }

    /// Adds several clips to the library, saving once.
    pub fn add_clips(&mut self, uploads: Vec<Upload>) -> Persisted<BatchUpload> {
        let persisted = self.library.add_clips(uploads);
        self.publish();
        persisted
    }

    /// Removes the first clip with the given name.
    pub fn remove_clip(&mut self, trigger: Trigger, name: &str) -> Persisted<Option<CustomClip>> {
        let persisted = self.library.remove_clip(trigger, name);
        self.publish();
        persisted
    }

    /// Removes every clip of a trigger.
    pub fn clear_clips(&mut self, trigger: Trigger) -> Persisted<Vec<CustomClip>> {
        let persisted = self.library.clear_clips(trigger);
        self.publish();
        persisted
    }

    /// Stores audio decoded in the background.
    pub fn cache_playable(&mut self, id: ClipId, audio: Arc<DecodedAudio>) -> bool {
        self.library.cache_playable(id, audio)
    }

    pub fn library(&self) -> &SoundLibrary {
        &self.library
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn labels(&self) -> &LabelController {
        &self.labels
    }

    /// The number of sounds still fading after a graceful stop.
    pub fn fading(&self) -> usize {
        self.fading.len()
    }

    /// The current status.
    pub fn status(&self) -> Status {
        StatusProjector::project(&self.state, &self.library)
    }

    /// Source events of the output context.
    pub fn output_events(&self) -> Receiver<SourceEvent> {
        self.output.events()
    }

    /// Opens the output ahead of the first sound. Returns its sample rate.
    pub fn open_output(&mut self) -> Result<u32, SoundboardError> {
        Ok(self.output.context()?.sample_rate())
    }

    /// The output context, if it is open.
    pub fn output(&self) -> Option<&OutputContext> {
        self.output
            .current()
            .filter(|context| context.state() != ContextState::Closed)
    }

    /// Stops everything, drops decoded audio and closes the output.
    pub fn shutdown(&mut self) {
        self.stop_all_sounds_immediately();
        self.library.release_all();
        self.output.close();
        info!("Playback shut down");
    }

    fn publish(&mut self) {
        self.status.publish(&self.state, &self.library);
    }
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("state", &self.state)
            .field("fading", &self.fading.len())
            .field("library", &self.library)
            .field("output", &self.output)
            .finish()
    }
}
