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

use crate::trigger::Trigger;

/// Errors surfaced by the soundboard core. None of these are fatal: every failure leaves the
/// board in a consistent, idle-observable state.
#[derive(Debug, thiserror::Error)]
pub enum SoundboardError {
    /// An upload was rejected because it is not an MP3 file.
    #[error("'{file_name}' is not an MP3 file")]
    InvalidFormat { file_name: String },

    /// The clip's bytes could not be turned into playable audio.
    #[error("unable to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// Playable audio exists but the output refused to start it.
    #[error("unable to start playback of '{name}': {reason}")]
    PlaybackStart { name: String, reason: String },

    /// Reading or writing durable storage failed.
    #[error("unable to {op} the sound library: {source}")]
    Persistence {
        op: PersistOp,
        #[source]
        source: StoreError,
    },

    /// A trigger key that doesn't name a known trigger.
    #[error("unknown trigger '{0}'")]
    UnknownTrigger(String),

    /// A clip lookup by display name found nothing.
    #[error("no clip named '{name}' for {trigger}")]
    ClipNotFound { trigger: Trigger, name: String },

    /// The audio output device could not be opened.
    #[error("audio output error: {0}")]
    Output(String),
}

impl SoundboardError {
    /// Returns true if this error should be shown to the user rather than only logged.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            SoundboardError::Persistence {
                op: PersistOp::Read,
                ..
            }
        )
    }
}

/// The persistence operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOp {
    Read,
    Write,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistOp::Read => write!(f, "read"),
            PersistOp::Write => write!(f, "write"),
        }
    }
}

/// Errors from a library store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}
