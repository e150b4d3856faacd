use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

pub const TOKENS_KEY: &str = "buildops.session.tokens";
pub const TENANT_KEY: &str = "buildops.session.tenant";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Session-scoped key/value mirror for credentials and the selected tenant.
/// Contents are expected to disappear when the session ends.
pub trait SessionStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Drop everything this session stored. Called on sign-out.
    fn end_session(&self) -> Result<(), StorageError> { Ok(()) }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

impl SessionStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn end_session(&self) -> Result<(), StorageError> {
        self.entries.write().clear();
        Ok(())
    }
}

/// One file per key under a session directory. `end_session` removes the directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

impl SessionStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io { path: self.dir.clone(), source: e })?;
        let path = self.path_for(key);
        // uniquely named temp file, then rename: a reader never sees a half-written blob
        // and concurrent writers never share a scratch file
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| StorageError::Io { path: self.dir.clone(), source: e })?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| StorageError::Io { path: tmp.path().to_path_buf(), source: e })?;
        tmp.persist(&path).map_err(|e| StorageError::Io { path: path.clone(), source: e.error })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    fn end_session(&self) -> Result<(), StorageError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path: self.dir.clone(), source: e }),
        }
    }
}
