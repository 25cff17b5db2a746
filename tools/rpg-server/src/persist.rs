//! Persistence store — atomic YAML documents under the data directory.
//!
//! Writes go to a `.tmp` sibling, fsync, then rename over the target, so a
//! crash never leaves a torn file observable. Advisory `fs2` locks around
//! each logical file keep a second process (or a concurrent sweep) from
//! interleaving save and load.
//!
//! Layout under the root:
//!
//! ```text
//! gamestate.yaml          gamestate.yaml.lock
//! characters/<id>.yaml    sessions/<id>.yaml
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Store failure. Every variant surfaces as kind `PersistenceFailure`.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed for {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("deserialization failed for {name}: {source}")]
    Deserialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl PersistError {
    pub fn kind(&self) -> &'static str {
        "PersistenceFailure"
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File-backed YAML store.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (and create) the data directory tree. Fails fast when the
    /// directory is not writable — a startup error, not a runtime one.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        for dir in [root.clone(), root.join("characters"), root.join("sessions")] {
            fs::create_dir_all(&dir).map_err(|e| PersistError::io(&dir, e))?;
        }
        // Writability probe.
        let probe = root.join(".write_probe");
        fs::write(&probe, b"ok").map_err(|e| PersistError::io(&probe, e))?;
        let _ = fs::remove_file(&probe);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.yaml"))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.yaml.lock"))
    }

    /// Take the advisory lock for a logical file, blocking.
    fn lock(&self, name: &str, exclusive: bool) -> Result<File, PersistError> {
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| PersistError::io(&path, e))?;
        if exclusive {
            file.lock_exclusive().map_err(|e| PersistError::io(&path, e))?;
        } else {
            file.lock_shared().map_err(|e| PersistError::io(&path, e))?;
        }
        Ok(file) // unlocked when dropped
    }

    /// Write bytes to `path` atomically: tmp sibling, fsync, rename.
    fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
        let tmp = path.with_extension("yaml.tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }
        {
            let mut file = File::create(&tmp).map_err(|e| PersistError::io(&tmp, e))?;
            file.write_all(bytes).map_err(|e| PersistError::io(&tmp, e))?;
            file.sync_all().map_err(|e| PersistError::io(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| PersistError::io(path, e))?;
        Ok(())
    }

    /// Serialize and persist a document.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PersistError> {
        let yaml = serde_yaml::to_string(value).map_err(|e| PersistError::Serialize {
            name: name.to_string(),
            source: e,
        })?;
        let _lock = self.lock(name, true)?;
        Self::atomic_write(&self.path_for(name), yaml.as_bytes())?;
        debug!(name, bytes = yaml.len(), "saved");
        Ok(())
    }

    /// Load a document. `Ok(None)` when it does not exist (a fresh start,
    /// not an error).
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PersistError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let _lock = self.lock(name, false)?;
        let raw = fs::read_to_string(&path).map_err(|e| PersistError::io(&path, e))?;
        let value = serde_yaml::from_str(&raw).map_err(|e| PersistError::Deserialize {
            name: name.to_string(),
            source: e,
        })?;
        Ok(Some(value))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Delete a document. Idempotent.
    pub fn delete(&self, name: &str) -> Result<(), PersistError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistError::io(&path, e)),
        }
    }

    /// Logical names under a sub-directory ("characters" → ["c1", ...]).
    pub fn list(&self, dir: &str) -> Result<Vec<String>, PersistError> {
        let path = self.root.join(dir);
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&path).map_err(|e| PersistError::io(&path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistError::io(&path, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                warn!(?entry, "skipping non-utf8 file name");
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".yaml") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        hp: i32,
        tags: Vec<String>,
    }

    fn doc() -> Doc {
        Doc {
            name: "Alice".into(),
            hp: 12,
            tags: vec!["fighter".into(), "north".into()],
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("gamestate", &doc()).unwrap();
        let loaded: Doc = store.load("gamestate").unwrap().unwrap();
        assert_eq!(loaded, doc());
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let loaded: Option<Doc> = store.load("gamestate").unwrap();
        assert!(loaded.is_none());
        assert!(!store.exists("gamestate"));
    }

    #[test]
    fn save_leaves_no_tmp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("gamestate", &doc()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("gamestate", &doc()).unwrap();
        let mut updated = doc();
        updated.hp = 1;
        store.save("gamestate", &updated).unwrap();
        let loaded: Doc = store.load("gamestate").unwrap().unwrap();
        assert_eq!(loaded.hp, 1);
    }

    #[test]
    fn nested_names_create_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("characters/c1", &doc()).unwrap();
        store.save("characters/c2", &doc()).unwrap();
        assert_eq!(store.list("characters").unwrap(), vec!["c1", "c2"]);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("gamestate", &doc()).unwrap();
        store.delete("gamestate").unwrap();
        store.delete("gamestate").unwrap();
        assert!(!store.exists("gamestate"));
    }

    #[test]
    fn corrupt_document_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        fs::write(dir.path().join("gamestate.yaml"), "{{{{not yaml").unwrap();
        let result: Result<Option<Doc>, _> = store.load("gamestate");
        let err = result.unwrap_err();
        assert_eq!(err.kind(), "PersistenceFailure");
    }

    #[test]
    fn list_skips_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("sessions/s1", &doc()).unwrap();
        // A lock file sits beside the document.
        assert!(dir.path().join("sessions/s1.yaml.lock").exists());
        assert_eq!(store.list("sessions").unwrap(), vec!["s1"]);
    }
}
