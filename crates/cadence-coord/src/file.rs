//! Directory-backed [`DurableStore`].
//!
//! Each key is a `/`-separated relative path under the store root. Saves
//! go to a hidden temp file next to the target and are renamed into place,
//! so a reader never sees a half-written blob.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cadence_core::{DurableStore, StoreError};

/// A [`DurableStore`] persisting each blob as a file.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: String::new(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its file path.
    ///
    /// Rejects empty keys, empty segments, and segments starting with `.`
    /// (which covers `..` and the temp-file namespace).
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .split('/')
                .all(|seg| !seg.is_empty() && !seg.starts_with('.') && !seg.contains('\\'));
        if !valid {
            return Err(StoreError::InvalidKey { key: key.into() });
        }
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }
}

fn io_err(key: &str) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        key: key.into(),
        source,
    }
}

impl DurableStore for FileStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { key: key.into() },
            _ => io_err(key)(e),
        })
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let (Some(dir), Some(file)) = (path.parent(), path.file_name()) else {
            return Err(StoreError::InvalidKey { key: key.into() });
        };
        fs::create_dir_all(dir).map_err(io_err(key))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file);
        tmp_name.push(".tmp");
        let tmp = dir.join(tmp_name);
        fs::write(&tmp, data).map_err(io_err(key))?;
        fs::rename(&tmp, &path).map_err(io_err(key))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save("effect/5/p1/a1", b"payload").unwrap();
        assert!(dir.path().join("effect/5/p1/a1").is_file());
        assert_eq!(store.load("effect/5/p1/a1").unwrap(), b"payload");
    }

    #[test]
    fn missing_file_is_not_found_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("partition/p9"),
            Err(StoreError::NotFound { .. })
        ));
        store.delete("partition/p9").unwrap();
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for key in ["", "../etc/passwd", "a//b", "/abs", "partition/.hidden", "a\\b"] {
            assert!(
                matches!(store.save(key, b"x"), Err(StoreError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save("partition/p1", b"v1").unwrap();
        store.save("partition/p1", b"v2").unwrap();
        let names: Vec<_> = fs::read_dir(dir.path().join("partition"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("p1")]);
        assert_eq!(store.load("partition/p1").unwrap(), b"v2");
    }
}
