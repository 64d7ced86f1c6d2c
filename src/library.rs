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


//! The sound library: per-trigger custom clips, their persistence and a cache of decoded audio.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::audio::DecodedAudio;
use crate::error::{PersistOp, SoundboardError};
use crate::trigger::Trigger;

mod store;
mod upload;

pub use store::{DirectoryStore, LibraryStore, StoredClip, StoredLibrary};
pub use upload::{Upload, MP3_MIME};

/// Global counter for clip IDs.
static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a clip for the lifetime of the process. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(u64);

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user supplied clip. The bytes are the source of truth; decoded audio is only a cache.
#[derive(Clone)]
pub struct CustomClip {
    id: ClipId,
    trigger: Trigger,
    name: String,
    bytes: Arc<[u8]>,
}

impl CustomClip {
    fn new(trigger: Trigger, name: String, bytes: Vec<u8>) -> Self {
        Self {
            id: ClipId(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed)),
            trigger,
            name,
            bytes: bytes.into(),
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    /// The trigger owning this clip.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw file content.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A shared handle to the raw content, for handing to decode workers.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }
}

/// Clips are equal when their content is; IDs are process-local.
impl PartialEq for CustomClip {
    fn eq(&self, other: &Self) -> bool {
        self.trigger == other.trigger && self.name == other.name && self.bytes == other.bytes
    }
}

impl std::fmt::Debug for CustomClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomClip")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The outcome of a library mutation. The mutation always sticks in memory; `saved` reports
/// whether it also reached durable storage.
#[must_use]
#[derive(Debug)]
pub struct Persisted<T> {
    pub value: T,
    pub saved: Result<(), SoundboardError>,
}

impl<T> Persisted<T> {
    fn new(value: T, saved: Result<(), SoundboardError>) -> Self {
        Self { value, saved }
    }

    /// Collapses into a result, treating a failed save as an error.
    pub fn into_result(self) -> Result<T, SoundboardError> {
        self.saved.map(|_| self.value)
    }
}

/// The result of a batch upload.
#[derive(Debug, Default)]
pub struct BatchUpload {
    /// Clips that were added, in upload order.
    pub added: Vec<ClipId>,
    /// Uploads that were rejected.
    pub rejected: Vec<SoundboardError>,
}

/// Per-trigger custom clips, backed by a store.
pub struct SoundLibrary {
    clips: BTreeMap<Trigger, Vec<CustomClip>>,
    /// Decoded audio for clips, keyed by clip. Derived, never persisted.
    playable: HashMap<ClipId, Arc<DecodedAudio>>,
    store: Box<dyn LibraryStore>,
}

impl SoundLibrary {
    /// Creates an empty library backed by the given store.
    pub fn new(store: Box<dyn LibraryStore>) -> Self {
        Self {
            clips: BTreeMap::new(),
            playable: HashMap::new(),
            store,
        }
    }

    /// Restores the library from the store. Never fails: missing or unreadable data yields an
    /// empty library, and keys that don't name a trigger are dropped.
    pub fn load(store: Box<dyn LibraryStore>) -> Self {
        let mut library = Self::new(store);
        let stored = match library.store.read_all() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!("No stored library, starting empty");
                return library;
            }
            Err(e) => {
                let err = SoundboardError::Persistence {
                    op: PersistOp::Read,
                    source: e,
                };
                error!(err = %err, "Unable to load library, starting empty");
                return library;
            }
        };

        for (key, clips) in stored {
            let Some(trigger) = Trigger::from_key(&key) else {
                warn!(key = %key, clips = clips.len(), "Dropping clips for unknown trigger");
                continue;
            };
            if clips.is_empty() {
                continue;
            }
            library.clips.insert(
                trigger,
                clips
                    .into_iter()
                    .map(|clip| CustomClip::new(trigger, clip.name, clip.payload))
                    .collect(),
            );
        }

        info!(
            triggers = library.triggers_with_clips(),
            clips = library.total_clips(),
            "Library loaded"
        );
        library
    }

    /// Writes the whole library to the store.
    pub fn save(&self) -> Result<(), SoundboardError> {
        let stored: StoredLibrary = self
            .clips
            .iter()
            .filter(|(_, clips)| !clips.is_empty())
            .map(|(trigger, clips)| {
                (
                    trigger.key().to_string(),
                    clips
                        .iter()
                        .map(|clip| StoredClip {
                            name: clip.name.clone(),
                            payload: clip.bytes.to_vec(),
                        })
                        .collect(),
                )
            })
            .collect();

        self.store.write_all(&stored).map_err(|e| {
            let err = SoundboardError::Persistence {
                op: PersistOp::Write,
                source: e,
            };
            warn!(err = %err, "Library not saved");
            err
        })
    }

    /// Validates an upload and appends it to its trigger's clips, then saves.
    pub fn add_clip(&mut self, upload: Upload) -> Result<Persisted<ClipId>, SoundboardError> {
        let id = self.insert(upload)?;
        Ok(Persisted::new(id, self.save()))
    }

    /// Adds several uploads at once. Invalid uploads are rejected individually and the
    /// library is saved once if anything was added.
    pub fn add_clips(&mut self, uploads: Vec<Upload>) -> Persisted<BatchUpload> {
        let mut batch = BatchUpload::default();
        for upload in uploads {
            match self.insert(upload) {
                Ok(id) => batch.added.push(id),
                Err(e) => batch.rejected.push(e),
            }
        }

        let saved = if batch.added.is_empty() {
            Ok(())
        } else {
            self.save()
        };
        Persisted::new(batch, saved)
    }

    fn insert(&mut self, upload: Upload) -> Result<ClipId, SoundboardError> {
        let (trigger, name, bytes) = upload.into_clip_parts().inspect_err(|e| {
            warn!(err = %e, "Upload rejected");
        })?;
        let clip = CustomClip::new(trigger, name, bytes);
        let id = clip.id;
        info!(trigger = %trigger, clip = clip.name(), id = %id, "Clip added");
        self.clips.entry(trigger).or_default().push(clip);
        Ok(id)
    }

    /// Removes the first clip with the given name. Saves only if something was removed.
    pub fn remove_clip(&mut self, trigger: Trigger, name: &str) -> Persisted<Option<CustomClip>> {
        let removed = self.clips.get_mut(&trigger).and_then(|clips| {
            let index = clips.iter().position(|clip| clip.name == name)?;
            Some(clips.remove(index))
        });

        match removed {
            Some(clip) => {
                self.release(clip.id);
                info!(trigger = %trigger, clip = name, "Clip removed");
                Persisted::new(Some(clip), self.save())
            }
            None => {
                debug!(trigger = %trigger, clip = name, "No clip to remove");
                Persisted::new(None, Ok(()))
            }
        }
    }

    /// Removes every clip of a trigger and saves.
    pub fn clear_clips(&mut self, trigger: Trigger) -> Persisted<Vec<CustomClip>> {
        let removed = self.clips.remove(&trigger).unwrap_or_default();
        for clip in &removed {
            self.release(clip.id);
        }
        info!(trigger = %trigger, clips = removed.len(), "Clips cleared");
        Persisted::new(removed, self.save())
    }

    /// The clips of a trigger, in insertion order.
    pub fn clips(&self, trigger: Trigger) -> &[CustomClip] {
        self.clips.get(&trigger).map(Vec::as_slice).unwrap_or_default()
    }

    /// Looks up a clip by ID.
    pub fn clip(&self, id: ClipId) -> Option<&CustomClip> {
        self.clips.values().flatten().find(|clip| clip.id == id)
    }

    /// Finds the first clip of a trigger with the given display name.
    pub fn find(&self, trigger: Trigger, name: &str) -> Option<&CustomClip> {
        self.clips(trigger).iter().find(|clip| clip.name == name)
    }

    /// Picks one of the trigger's clips uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, trigger: Trigger, rng: &mut R) -> Option<&CustomClip> {
        self.clips(trigger).choose(rng)
    }

    /// Every clip in the library.
    pub fn all_clips(&self) -> impl Iterator<Item = &CustomClip> {
        self.clips.values().flatten()
    }

    /// The number of triggers with at least one clip.
    pub fn triggers_with_clips(&self) -> usize {
        self.clips.values().filter(|clips| !clips.is_empty()).count()
    }

    /// The total number of clips.
    pub fn total_clips(&self) -> usize {
        self.clips.values().map(Vec::len).sum()
    }

    /// The decoded audio for a clip, if cached.
    pub fn playable(&self, id: ClipId) -> Option<Arc<DecodedAudio>> {
        self.playable.get(&id).cloned()
    }

    /// Caches decoded audio for a clip. Ignored if the clip has been removed in the meantime.
    pub fn cache_playable(&mut self, id: ClipId, audio: Arc<DecodedAudio>) -> bool {
        if self.clip(id).is_none() {
            debug!(id = %id, "Discarding decoded audio for removed clip");
            return false;
        }
        self.playable.insert(id, audio);
        true
    }

    /// The number of cached decoded clips.
    pub fn cached(&self) -> usize {
        self.playable.len()
    }

    /// Drops every cached decoded clip.
    pub fn release_all(&mut self) {
        let released = self.playable.len();
        self.playable.clear();
        debug!(released, "Released decoded clips");
    }

    fn release(&mut self, id: ClipId) {
        if self.playable.remove(&id).is_some() {
            debug!(id = %id, "Released decoded clip");
        }
    }
}

impl std::fmt::Debug for SoundLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundLibrary")
            .field("clips", &self.clips)
            .field("cached", &self.playable.len())
            .finish()
    }
}
