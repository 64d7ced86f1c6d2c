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


//! A read-only summary of playback and library state.

use std::fmt;

use tracing::trace;

use crate::library::SoundLibrary;
use crate::playback::PlaybackState;
use crate::trigger::Trigger;

/// The label shown while an untracked preview plays.
pub const PREVIEW_LABEL: &str = "Vorschau";

/// Whether anything is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackPhase::Idle => write!(f, "Bereit"),
            PlaybackPhase::Playing => write!(f, "Spielt ab"),
        }
    }
}

/// How many triggers have custom clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// No trigger has a clip.
    Empty,
    Partial,
    /// Every trigger has at least one clip.
    Complete,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completeness::Empty => write!(f, "Unvollständig"),
            Completeness::Partial => write!(f, "Teilweise"),
            Completeness::Complete => write!(f, "Vollständig"),
        }
    }
}

/// Counts derived from the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySummary {
    pub triggers_with_clips: usize,
    pub total_triggers: usize,
    pub total_clips: usize,
    /// Clip counts in board order.
    pub per_trigger: Vec<(Trigger, usize)>,
}

impl LibrarySummary {
    fn new(library: &SoundLibrary) -> Self {
        Self {
            triggers_with_clips: library.triggers_with_clips(),
            total_triggers: Trigger::ALL.len(),
            total_clips: library.total_clips(),
            per_trigger: Trigger::ALL
                .into_iter()
                .map(|trigger| (trigger, library.clips(trigger).len()))
                .collect(),
        }
    }

    pub fn completeness(&self) -> Completeness {
        match self.triggers_with_clips {
            0 => Completeness::Empty,
            n if n >= self.total_triggers => Completeness::Complete,
            _ => Completeness::Partial,
        }
    }

    /// The clip count of one trigger.
    pub fn clips(&self, trigger: Trigger) -> usize {
        self.per_trigger
            .iter()
            .find(|(t, _)| *t == trigger)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// A snapshot of everything the status display shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub phase: PlaybackPhase,
    /// What the first active entry plays: its trigger's display name, or the preview label.
    pub current: Option<String>,
    pub library: LibrarySummary,
}

impl Status {
    pub fn completeness(&self) -> Completeness {
        self.library.completeness()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} ({}/{})",
            self.phase,
            self.current.as_deref().unwrap_or("-"),
            self.completeness(),
            self.library.total_clips,
            self.library.total_triggers,
        )
    }
}

/// The per-trigger file counter text.
pub fn file_count_label(count: usize) -> String {
    if count == 1 {
        "1 Datei".to_string()
    } else {
        format!("{} Dateien", count)
    }
}

/// Receives every recomputed status.
pub trait StatusSink: Send {
    fn publish(&mut self, status: &Status);
}

/// Derives status from playback and library state and forwards it to the sinks. Holds no
/// state of its own beyond the sinks.
#[derive(Default)]
pub struct StatusProjector {
    sinks: Vec<Box<dyn StatusSink>>,
}

impl StatusProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn subscribe(&mut self, sink: Box<dyn StatusSink>) {
        self.sinks.push(sink);
    }

    /// Computes the status.
    pub fn project(state: &PlaybackState, library: &SoundLibrary) -> Status {
        let current = state.entries().first().map(|entry| {
            if entry.is_preview() {
                PREVIEW_LABEL.to_string()
            } else {
                entry.trigger().display_name().to_string()
            }
        });

        Status {
            phase: if state.is_idle() {
                PlaybackPhase::Idle
            } else {
                PlaybackPhase::Playing
            },
            current,
            library: LibrarySummary::new(library),
        }
    }

    /// Recomputes the status and hands it to every sink.
    pub fn publish(&mut self, state: &PlaybackState, library: &SoundLibrary) -> Status {
        let status = Self::project(state, library);
        trace!(status = %status, "Status published");
        for sink in self.sinks.iter_mut() {
            sink.publish(&status);
        }
        status
    }
}

impl fmt::Debug for StatusProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusProjector")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
