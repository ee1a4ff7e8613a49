// SPDX-License-Identifier: MIT

//! Registry file persistence: atomic write-temp-then-rename, a small
//! rotated `.bak` generation policy copied from the teacher's
//! `storage::snapshot::rotate_bak_path`, and the single-writer advisory
//! lock acquired once at open time, copied in shape from the teacher's
//! `lifecycle::startup`'s `FileExt::try_lock_exclusive` use.
//!
//! Unlike the teacher, there is no WAL/replay here — the spec's registry
//! is a single flat JSON document, not an event-sourced materialized
//! state, so the snapshot's "rotate a few backup generations" policy is
//! the whole persistence story (documented as the open compaction
//! question's resolution in DESIGN.md).

use crate::model::RegistryDocument;
use fs2::FileExt;
use fleet_core::FleetError;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_BAK_FILES: u32 = 3;

/// Owns the registry file's path and the advisory lock file for as long as
/// this process runs. The lock is released when the `File` is dropped.
pub struct RegistryStore {
    path: PathBuf,
    _lock_file: fs::File,
}

impl RegistryStore {
    /// Acquires the exclusive advisory lock and loads the current document
    /// (or an empty one if the file doesn't exist yet), per spec §9's
    /// "fail fast if another controller holds it".
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, RegistryDocument), FleetError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FleetError::persistence(path.display().to_string(), e))?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| FleetError::persistence(lock_path.display().to_string(), e))?;
        lock_file.try_lock_exclusive().map_err(|e| {
            FleetError::persistence(
                lock_path.display().to_string(),
                format!("another controller already holds the registry lock: {e}"),
            )
        })?;

        let document = load(&path)?;
        Ok((Self { path, _lock_file: lock_file }, document))
    }

    pub fn save(&self, document: &RegistryDocument) -> Result<(), FleetError> {
        write_atomic(&self.path, document)
    }
}

fn load(path: &Path) -> Result<RegistryDocument, FleetError> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|e| FleetError::persistence(path.display().to_string(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryDocument::default()),
        Err(e) => Err(FleetError::persistence(path.display().to_string(), e)),
    }
}

fn write_atomic(path: &Path, document: &RegistryDocument) -> Result<(), FleetError> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| FleetError::persistence(path.display().to_string(), e))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).map_err(|e| FleetError::persistence(tmp.display().to_string(), e))?;

    if path.exists() {
        let bak = rotate_bak_path(path);
        let _ = fs::rename(path, bak);
    }
    fs::rename(&tmp, path).map_err(|e| FleetError::persistence(path.display().to_string(), e))
}

/// Picks the next `.bak` / `.bak.N` path, rotating older backups out. Keeps
/// up to [`MAX_BAK_FILES`] generations; the oldest is removed when the
/// limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudioInstance;
    use fleet_core::StudioStatus;

    fn sample_doc() -> RegistryDocument {
        RegistryDocument {
            last_updated: chrono::Utc::now(),
            instances: vec![StudioInstance::new(100, 3050, "/p", "demo", 0, StudioStatus::Running)],
        }
    }

    #[test]
    fn open_creates_empty_document_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".studio-registry.json");
        let (_store, doc) = RegistryStore::open(&path).unwrap();
        assert!(doc.instances.is_empty());
    }

    #[test]
    fn save_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".studio-registry.json");
        {
            let (store, _doc) = RegistryStore::open(&path).unwrap();
            store.save(&sample_doc()).unwrap();
        }
        let (_store, doc) = RegistryStore::open(&path).unwrap();
        assert_eq!(doc.instances.len(), 1);
        assert_eq!(doc.instances[0].port, 3050);
    }

    #[test]
    fn second_open_fails_while_first_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".studio-registry.json");
        let (_store, _doc) = RegistryStore::open(&path).unwrap();
        assert!(RegistryStore::open(&path).is_err());
    }

    #[test]
    fn save_rotates_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".studio-registry.json");
        let (store, _doc) = RegistryStore::open(&path).unwrap();
        for _ in 0..2 {
            store.save(&sample_doc()).unwrap();
        }
        assert!(path.with_extension("bak").exists());
    }
}
