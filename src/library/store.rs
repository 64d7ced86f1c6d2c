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


//! Durable storage for the sound library.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

const INDEX_FILE: &str = "index.json";
/// Payload directories are named `blobs-<generation>`.
const GENERATION_PREFIX: &str = "blobs-";
const STAGING_SUFFIX: &str = "new";

/// One persisted clip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredClip {
    pub name: String,
    pub payload: Vec<u8>,
}

/// The serialized library: trigger key to ordered clips. Keys are not validated here.
pub type StoredLibrary = BTreeMap<String, Vec<StoredClip>>;

/// The persistence collaborator.
pub trait LibraryStore: Send {
    /// Reads the whole library. `Ok(None)` means nothing has been stored yet.
    fn read_all(&self) -> Result<Option<StoredLibrary>, StoreError>;

    /// Replaces the stored library with the given one.
    fn write_all(&self, library: &StoredLibrary) -> Result<(), StoreError>;
}

/// An entry in the on-disk index, pointing at a payload file.
#[derive(Serialize, Deserialize)]
struct IndexEntry {
    name: String,
    blob: String,
}

/// The on-disk index. It names the payload generation it was written with.
#[derive(Serialize, Deserialize)]
struct Index {
    generation: u64,
    triggers: BTreeMap<String, Vec<IndexEntry>>,
}

/// Stores the library in a directory: an `index.json` mapping trigger keys to clip names
/// and payload files, and the raw payloads under `blobs-<generation>/`. Every write goes to a
/// fresh generation; replacing the index commits it.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Creates a store rooted at the given directory. Nothing is touched until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding the library.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staged(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, STAGING_SUFFIX))
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.root.join(format!("{}{}", GENERATION_PREFIX, generation))
    }

    /// Payload generations present on disk, committed or not.
    fn generations(&self) -> Result<Vec<u64>, StoreError> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(generation) = name
                .to_str()
                .and_then(|name| name.strip_prefix(GENERATION_PREFIX))
                .and_then(|number| number.parse::<u64>().ok())
            else {
                continue;
            };
            if entry.file_type()?.is_dir() {
                generations.push(generation);
            }
        }
        Ok(generations)
    }

    /// Removes every generation except the live one. Failures only leave garbage behind.
    fn remove_stale_generations(&self, live: u64) {
        let generations = match self.generations() {
            Ok(generations) => generations,
            Err(e) => {
                warn!(root = ?self.root, err = %e, "Unable to list payload generations");
                return;
            }
        };
        for generation in generations.into_iter().filter(|g| *g != live) {
            let dir = self.generation_dir(generation);
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = ?dir, err = %e, "Unable to remove stale payloads");
            }
        }
    }
}

/// Returns true if the blob name is a plain file name.
fn is_plain_file_name(blob: &str) -> bool {
    !blob.contains(['/', '\\'])
        && Path::new(blob).file_name().and_then(|name| name.to_str()) == Some(blob)
}

impl LibraryStore for DirectoryStore {
    fn read_all(&self) -> Result<Option<StoredLibrary>, StoreError> {
        let index_path = self.root.join(INDEX_FILE);
        let contents = match fs::read_to_string(&index_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let index: Index = serde_json::from_str(&contents)?;

        let blobs = self.generation_dir(index.generation);
        let mut library = StoredLibrary::new();
        for (key, entries) in index.triggers {
            let mut clips = Vec::with_capacity(entries.len());
            for entry in entries {
                if !is_plain_file_name(&entry.blob) {
                    warn!(
                        key = %key,
                        clip = %entry.name,
                        blob = %entry.blob,
                        "Skipping clip with a payload outside the library"
                    );
                    continue;
                }
                match fs::read(blobs.join(&entry.blob)) {
                    Ok(payload) => clips.push(StoredClip {
                        name: entry.name,
                        payload,
                    }),
                    Err(e) => {
                        warn!(
                            key = %key,
                            clip = %entry.name,
                            blob = %entry.blob,
                            err = %e,
                            "Skipping clip with unreadable payload"
                        );
                    }
                }
            }
            library.insert(key, clips);
        }

        Ok(Some(library))
    }

    fn write_all(&self, library: &StoredLibrary) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;

        // Never reuse a directory, even one left behind by an interrupted write.
        let generation = self.generations()?.into_iter().max().unwrap_or(0) + 1;
        let blobs = self.generation_dir(generation);
        fs::create_dir(&blobs)?;

        let mut triggers: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
        for (key, clips) in library {
            let mut entries = Vec::with_capacity(clips.len());
            for (i, clip) in clips.iter().enumerate() {
                let blob = format!("{}-{}.mp3", key, i);
                fs::write(blobs.join(&blob), &clip.payload)?;
                entries.push(IndexEntry {
                    name: clip.name.clone(),
                    blob,
                });
            }
            triggers.insert(key.clone(), entries);
        }

        let index = Index {
            generation,
            triggers,
        };
        let staged_index = self.staged(INDEX_FILE);
        fs::write(&staged_index, serde_json::to_string_pretty(&index)?)?;
        fs::rename(&staged_index, self.root.join(INDEX_FILE))?;

        self.remove_stale_generations(generation);
        debug!(root = ?self.root, generation, triggers = library.len(), "Library written");
        Ok(())
    }
}

impl std::fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, payload: &[u8]) -> StoredClip {
        StoredClip {
            name: name.to_string(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_read_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("library"));
        assert!(store.read_all().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("library"));

        let mut library = StoredLibrary::new();
        library.insert(
            "tor".to_string(),
            vec![clip("jubel", &[1, 2, 3]), clip("horn", &[4, 5])],
        );
        library.insert("sieg".to_string(), vec![clip("fanfare", &[6])]);
        store.write_all(&library).unwrap();

        assert_eq!(store.read_all().unwrap(), Some(library));
    }

    #[test]
    fn test_rewrite_drops_old_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        let mut library = StoredLibrary::new();
        library.insert(
            "tor".to_string(),
            vec![clip("a", &[1]), clip("b", &[2]), clip("c", &[3])],
        );
        store.write_all(&library).unwrap();

        library.insert("tor".to_string(), vec![clip("c", &[3])]);
        store.write_all(&library).unwrap();

        assert!(!dir.path().join("blobs-1").exists());
        let blobs: Vec<_> = fs::read_dir(dir.path().join("blobs-2"))
            .unwrap()
            .collect();
        assert_eq!(blobs.len(), 1);
        assert_eq!(store.read_all().unwrap(), Some(library));
    }

    #[test]
    fn test_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "{ not json").unwrap();

        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.read_all(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_missing_blob_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        let mut library = StoredLibrary::new();
        library.insert("tor".to_string(), vec![clip("a", &[1]), clip("b", &[2])]);
        store.write_all(&library).unwrap();
        fs::remove_file(dir.path().join("blobs-1").join("tor-0.mp3")).unwrap();

        let read = store.read_all().unwrap().unwrap();
        assert_eq!(read.get("tor"), Some(&vec![clip("b", &[2])]));
    }

    #[test]
    fn test_failed_write_keeps_previous_library() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        let mut library = StoredLibrary::new();
        library.insert("tor".to_string(), vec![clip("a", &[1]), clip("b", &[2])]);
        store.write_all(&library).unwrap();

        // A directory in the way of the staged index makes the next write fail before commit.
        fs::create_dir(dir.path().join("index.json.new")).unwrap();
        let mut smaller = StoredLibrary::new();
        smaller.insert("tor".to_string(), vec![clip("b", &[2])]);
        assert!(store.write_all(&smaller).is_err());

        assert_eq!(store.read_all().unwrap(), Some(library.clone()));

        // The uncommitted generation is not reused and is cleaned up by the next good write.
        fs::remove_dir(dir.path().join("index.json.new")).unwrap();
        store.write_all(&smaller).unwrap();
        assert_eq!(store.read_all().unwrap(), Some(smaller));
        assert!(dir.path().join("blobs-3").is_dir());
        assert!(!dir.path().join("blobs-1").exists());
        assert!(!dir.path().join("blobs-2").exists());
    }

    #[test]
    fn test_blob_outside_library_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("library");
        fs::create_dir_all(root.join("blobs-1")).unwrap();
        fs::write(dir.path().join("secret.mp3"), [9, 9]).unwrap();
        fs::write(root.join("blobs-1").join("tor-0.mp3"), [1]).unwrap();
        let absolute = dir.path().join("secret.mp3");

        let index = serde_json::json!({
            "generation": 1,
            "triggers": {
                "tor": [
                    { "name": "escape", "blob": "../secret.mp3" },
                    { "name": "absolute", "blob": absolute.to_str().unwrap() },
                    { "name": "nested", "blob": "sub/tor-0.mp3" },
                    { "name": "ok", "blob": "tor-0.mp3" },
                ]
            }
        });
        fs::write(root.join(INDEX_FILE), index.to_string()).unwrap();

        let store = DirectoryStore::new(root.clone());
        let read = store.read_all().unwrap().unwrap();
        assert_eq!(read.get("tor"), Some(&vec![clip("ok", &[1])]));
    }
}
