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

use std::fs;
use std::path::Path;

use crate::error::SoundboardError;
use crate::trigger::Trigger;
use crate::util;

/// The MIME type accepted for uploads.
pub const MP3_MIME: &str = "audio/mpeg";

/// A file handed to the library by the upload collaborator.
#[derive(Clone)]
pub struct Upload {
    /// The trigger the file should be assigned to.
    trigger: Trigger,
    /// The original file name, including its extension.
    file_name: String,
    /// The declared MIME type, if the collaborator knows it.
    mime: Option<String>,
    /// The raw file content.
    bytes: Vec<u8>,
}

impl Upload {
    /// Creates a new upload.
    pub fn new(
        trigger: Trigger,
        file_name: impl Into<String>,
        mime: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            trigger,
            file_name: file_name.into(),
            mime,
            bytes,
        }
    }

    /// Reads an upload from disk. The type is judged from the file extension only.
    pub fn from_path(trigger: Trigger, path: &Path) -> Result<Self, std::io::Error> {
        let bytes = fs::read(path)?;
        Ok(Self::new(trigger, util::filename_display(path), None, bytes))
    }

    /// The trigger the upload targets.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// The original file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns true if the upload is MIME-typed or extension-typed as MP3.
    pub fn is_mp3(&self) -> bool {
        self.mime.as_deref() == Some(MP3_MIME)
            || self.file_name.to_ascii_lowercase().ends_with(".mp3")
    }

    /// Validates the upload, yielding the clip's display name and payload.
    pub(super) fn into_clip_parts(self) -> Result<(Trigger, String, Vec<u8>), SoundboardError> {
        if !self.is_mp3() {
            return Err(SoundboardError::InvalidFormat {
                file_name: self.file_name,
            });
        }
        let name = util::clip_display_name(&self.file_name);
        Ok((self.trigger, name, self.bytes))
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("trigger", &self.trigger)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
