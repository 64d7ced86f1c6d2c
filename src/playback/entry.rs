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

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::audio::{ClipHandle, SourceId, ToneHandle};
use crate::trigger::Trigger;

/// Global counter for entry IDs.
static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the sound of an entry comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A user supplied clip.
    Custom,
    /// A synthesized fallback tone.
    Generated,
}

/// The sound an entry owns.
#[derive(Debug)]
pub enum PlaybackHandle {
    Clip(ClipHandle),
    Tone(ToneHandle),
}

impl PlaybackHandle {
    pub fn source_id(&self) -> SourceId {
        match self {
            PlaybackHandle::Clip(clip) => clip.id(),
            PlaybackHandle::Tone(tone) => tone.id(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            PlaybackHandle::Clip(_) => SourceKind::Custom,
            PlaybackHandle::Tone(_) => SourceKind::Generated,
        }
    }

    /// Stops with no fade.
    pub fn halt(&self) {
        match self {
            PlaybackHandle::Clip(clip) => {
                clip.pause();
            }
            PlaybackHandle::Tone(tone) => {
                tone.halt();
            }
        }
    }

    /// Fades to silence, pausing or halting when the fade completes.
    pub fn fade_out(&self, duration: Duration) {
        match self {
            PlaybackHandle::Clip(clip) => clip.fade_out(duration),
            PlaybackHandle::Tone(tone) => tone.fade_out(duration),
        };
    }

    /// Zeroes the gain and stops right away.
    pub fn force_stop(&self) {
        match self {
            PlaybackHandle::Clip(clip) => clip.force_stop(),
            PlaybackHandle::Tone(tone) => tone.force_stop(),
        }
    }

    /// Changes the volume of a playing clip. Tones keep the envelope they started with.
    pub fn set_volume(&self, volume: f32) -> bool {
        match self {
            PlaybackHandle::Clip(clip) => {
                clip.set_volume(volume);
                true
            }
            PlaybackHandle::Tone(_) => false,
        }
    }

    /// The current gain of the sound, None once it has stopped.
    pub fn gain(&self) -> Option<f32> {
        match self {
            PlaybackHandle::Clip(clip) => clip.volume(),
            PlaybackHandle::Tone(tone) => tone.gain(),
        }
    }

    /// Returns true while the sound is registered with the output.
    pub fn is_live(&self) -> bool {
        match self {
            PlaybackHandle::Clip(clip) => clip.is_live(),
            PlaybackHandle::Tone(tone) => tone.is_live(),
        }
    }
}

/// One sounding instance and its bookkeeping.
#[derive(Debug)]
pub struct PlaybackEntry {
    id: EntryId,
    trigger: Trigger,
    handle: PlaybackHandle,
    /// The control showing feedback for this entry. None for previews.
    control: Option<Trigger>,
    /// The clip name or tone text shown while playing.
    label: String,
}

impl PlaybackEntry {
    pub fn new(
        trigger: Trigger,
        handle: PlaybackHandle,
        control: Option<Trigger>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed)),
            trigger,
            handle,
            control,
            label: label.into(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn kind(&self) -> SourceKind {
        self.handle.kind()
    }

    pub fn handle(&self) -> &PlaybackHandle {
        &self.handle
    }

    pub fn control(&self) -> Option<Trigger> {
        self.control
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Previews have no bound control.
    pub fn is_preview(&self) -> bool {
        self.control.is_none()
    }
}

/// The process-wide playback state.
#[derive(Debug)]
pub struct PlaybackState {
    entries: Vec<PlaybackEntry>,
    volume: f32,
}

impl PlaybackState {
    pub fn new(volume: f32) -> Self {
        Self {
            entries: Vec::new(),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Active entries in start order.
    pub fn entries(&self) -> &[PlaybackEntry] {
        &self.entries
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets the volume, clamped to 0.0..=1.0, and returns the value used.
    pub(super) fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = volume.clamp(0.0, 1.0);
        self.volume
    }

    pub(super) fn push(&mut self, entry: PlaybackEntry) {
        self.entries.push(entry);
    }

    pub(super) fn remove(&mut self, id: EntryId) -> Option<PlaybackEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub(super) fn remove_source(&mut self, source: SourceId) -> Option<PlaybackEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.handle.source_id() == source)?;
        Some(self.entries.remove(index))
    }

    pub(super) fn take_all(&mut self) -> Vec<PlaybackEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Returns true if any entry is bound to the control.
    pub fn has_control(&self, control: Trigger) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.control == Some(control))
    }
}
