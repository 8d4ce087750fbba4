//! File-backed [`KeyValueStore`].
//!
//! All keys live in a single JSON object at `<dir>/session.json`. Every read
//! loads the file so separate processes (or a restarted one) observe the
//! latest write. Writes go to `session.json.tmp`, are synced, then renamed
//! over the target, so the file always holds either the old or the new
//! content.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyValueStore, StorageError, StorageResult};

const SESSION_FILENAME: &str = "session.json";
const TEMP_SUFFIX: &str = "tmp";

/// Persistent store for session values under a directory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| {
            StorageError::io(format!("create {}", dir.display()), err)
        })?;
        Ok(Self {
            path: dir.join(SESSION_FILENAME),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new())
            }
            Err(err) => {
                return Err(StorageError::io(
                    format!("read {}", self.path.display()),
                    err,
                ))
            }
        };
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|err| StorageError::Corrupted {
            context: format!("{}: {err}", self.path.display()),
        })
    }

    fn store(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec_pretty(values).map_err(|err| StorageError::Corrupted {
                context: format!("encode session: {err}"),
            })?;
        let temp = self.path.with_extension(format!("json.{TEMP_SUFFIX}"));
        let mut file = fs::File::create(&temp)
            .map_err(|err| StorageError::io(format!("create {}", temp.display()), err))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| StorageError::io(format!("write {}", temp.display()), err))?;
        fs::rename(&temp, &self.path).map_err(|err| {
            StorageError::io(format!("rename to {}", self.path.display()), err)
        })
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("file store lock poisoned".into()))?;
        let mut values = self.load()?;
        if apply(&mut values) {
            self.store(&values)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|values| values.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("aurea.access_token", "a.b.c").unwrap();
            store.set("refresh_token", "r1").unwrap();
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("aurea.access_token").unwrap().as_deref(),
            Some("a.b.c")
        );
        assert_eq!(reopened.get("refresh_token").unwrap().as_deref(), Some("r1"));
        assert!(!reopened.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();
        assert_eq!(store.get("token").unwrap(), None);
        store.remove("token").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        let err = store.get("token").unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }
}
