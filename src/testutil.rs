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

//! Fakes and fixtures shared by the unit tests.

use std::io::Cursor;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::error::{SoundboardError, StoreError};
use crate::labels::Control;
use crate::library::{LibraryStore, StoredLibrary, Upload};
use crate::soundboard::Notifier;
use crate::status::{Status, StatusSink};
use crate::trigger::Trigger;

/// Encodes samples as a 16 bit WAV file in memory. The decoder detects the format by
/// content, so these stand in for MP3 payloads.
pub fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("Unable to create WAV writer");
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).expect("Unable to write sample");
        }
        writer.finalize().expect("Unable to finalize WAV");
    }
    cursor.into_inner()
}

/// A playable upload: a mono clip at half scale lasting `seconds`.
pub fn clip_upload(trigger: Trigger, file_name: &str, seconds: f32, sample_rate: u32) -> Upload {
    let frames = (seconds * sample_rate as f32) as usize;
    let bytes = wav_bytes(&vec![0.5; frames], 1, sample_rate);
    Upload::new(trigger, file_name, None, bytes)
}

#[derive(Default)]
struct MemoryInner {
    library: Option<StoredLibrary>,
    writes: usize,
    fail_writes: bool,
    fail_reads: bool,
}

/// An in-memory store. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    /// A store that already holds the given library.
    pub fn with_library(library: StoredLibrary) -> MemoryStore {
        let store = MemoryStore::default();
        store.inner.lock().library = Some(library);
        store
    }

    /// The number of successful writes.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// The last written library.
    pub fn snapshot(&self) -> StoredLibrary {
        self.inner.lock().library.clone().unwrap_or_default()
    }
}

impl LibraryStore for MemoryStore {
    fn read_all(&self) -> Result<Option<StoredLibrary>, StoreError> {
        let inner = self.inner.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("read refused".into()));
        }
        Ok(inner.library.clone())
    }

    fn write_all(&self, library: &StoredLibrary) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("write refused".into()));
        }
        inner.library = Some(library.clone());
        inner.writes += 1;
        Ok(())
    }
}

struct ControlInner {
    label: String,
    active: bool,
    history: Vec<String>,
}

/// A control that remembers every label it was given.
#[derive(Clone)]
pub struct RecordingControl {
    inner: Arc<Mutex<ControlInner>>,
}

impl RecordingControl {
    pub fn new(label: &str) -> RecordingControl {
        RecordingControl {
            inner: Arc::new(Mutex::new(ControlInner {
                label: label.to_string(),
                active: false,
                history: Vec::new(),
            })),
        }
    }

    pub fn label(&self) -> String {
        self.inner.lock().label.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Every label set so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.inner.lock().history.clone()
    }

    /// What the control currently shows.
    pub fn snapshot(&self) -> (String, bool) {
        let inner = self.inner.lock();
        (inner.label.clone(), inner.active)
    }
}

impl Control for RecordingControl {
    fn label(&self) -> String {
        RecordingControl::label(self)
    }

    fn set_label(&mut self, text: &str) {
        let mut inner = self.inner.lock();
        inner.label = text.to_string();
        inner.history.push(text.to_string());
    }

    fn set_active(&mut self, active: bool) {
        self.inner.lock().active = active;
    }
}

/// Collects every published status.
#[derive(Clone, Default)]
pub struct RecordingSink {
    published: Arc<Mutex<Vec<Status>>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<Status> {
        self.published.lock().clone()
    }

    pub fn last(&self) -> Option<Status> {
        self.published.lock().last().cloned()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&mut self, status: &Status) {
        self.published.lock().push(status.clone());
    }
}

/// Collects the messages of every notified error.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, error: &SoundboardError) {
        self.messages.lock().push(error.to_string());
    }
}
