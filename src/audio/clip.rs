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


//! Playback of decoded custom clips.

use std::sync::Arc;
use std::time::Duration;

use super::automation::Automation;
use super::context::{ContextError, OutputContext, SourceHandle, SourceId, Voice};
use super::decode::DecodedAudio;

/// One playback of a decoded clip. The gain curve is the clip's volume.
#[derive(Debug, Clone)]
pub struct ClipHandle {
    source: SourceHandle,
    duration: Duration,
}

impl ClipHandle {
    /// Prepares a clip for playback at the given volume.
    pub fn new(context: &OutputContext, audio: Arc<DecodedAudio>, volume: f32) -> Self {
        let duration = audio.duration();
        let id = context.register(
            Voice::Clip { audio, frame: 0 },
            Automation::new(volume.clamp(0.0, 1.0)),
        );
        Self {
            source: SourceHandle::new(context.clone(), id),
            duration,
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    /// The playing time of the clip.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts playback now.
    pub fn play(&self) -> Result<(), ContextError> {
        self.source.start()
    }

    /// Changes the volume of the playing clip right away.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.source.context().automate(self.id(), |gain, now| {
            gain.cancel_scheduled_values(now);
            gain.set_value_at(volume, now);
        });
    }

    /// The current volume, or None once the clip is gone.
    pub fn volume(&self) -> Option<f32> {
        self.source.gain()
    }

    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }

    /// When the clip pauses after a fade, if one is scheduled.
    pub fn pause_time(&self) -> Option<f64> {
        self.source.stop_time()
    }

    /// Fades the volume to zero and pauses when the fade completes.
    pub fn fade_out(&self, duration: Duration) -> f64 {
        self.source.fade_out(duration)
    }

    /// Mutes and pauses right away.
    pub fn force_stop(&self) {
        self.source.force_stop()
    }

    /// Pauses right away.
    pub fn pause(&self) -> bool {
        self.source.halt()
    }
}
