//! File-backed [`StateStore`].
//!
//! `state.toml` holds two optional keys:
//!
//! ```toml
//! device_id = "C0:FF:EE:00:00:01"
//! last_error = "write failed at chunk 3 of 9: not connected"
//! ```
//!
//! Every mutation rewrites the whole file.  The state is tiny and changes
//! only on user actions and failures, so there is nothing to batch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::store::{StateStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

/// State store persisted as TOML at a fixed path.
#[derive(Debug)]
pub struct TomlStateStore {
    path: PathBuf,
    state: PersistedState,
}

impl TomlStateStore {
    /// Opens the store, reading `path` if it exists.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the file exists but cannot be read,
    /// [`StoreError::Format`] when it is not valid state TOML.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| StoreError::Format(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), "state store opened");
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content =
            toml::to_string_pretty(&self.state).map_err(|e| StoreError::Format(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl StateStore for TomlStateStore {
    fn load_device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.device_id.clone())
    }

    fn save_device_id(&mut self, id: &str) -> Result<(), StoreError> {
        if self.state.device_id.as_deref() == Some(id) {
            return Ok(());
        }
        self.state.device_id = Some(id.to_string());
        self.persist()
    }

    fn clear_device_id(&mut self) -> Result<(), StoreError> {
        self.state.device_id = None;
        self.persist()
    }

    fn save_last_error(&mut self, message: &str) -> Result<(), StoreError> {
        self.state.last_error = Some(message.to_string());
        self.persist()
    }

    fn take_last_error(&mut self) -> Result<Option<String>, StoreError> {
        let taken = self.state.last_error.take();
        if taken.is_some() {
            self.persist()?;
        }
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("typist_state_{}", Uuid::new_v4()))
            .join("state.toml")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let store = TomlStateStore::open(temp_path()).unwrap();
        assert_eq!(store.load_device_id().unwrap(), None);
    }

    #[test]
    fn test_device_id_survives_reopen() {
        // Arrange
        let path = temp_path();
        let mut store = TomlStateStore::open(&path).unwrap();

        // Act
        store.save_device_id("AA:BB:CC").unwrap();
        let reopened = TomlStateStore::open(&path).unwrap();

        // Assert
        assert_eq!(reopened.load_device_id().unwrap().as_deref(), Some("AA:BB:CC"));
        cleanup(&path);
    }

    #[test]
    fn test_last_error_is_taken_once_across_restarts() {
        // Arrange
        let path = temp_path();
        let mut store = TomlStateStore::open(&path).unwrap();
        store.save_last_error("link lost").unwrap();

        // Act
        let mut next_run = TomlStateStore::open(&path).unwrap();
        let shown = next_run.take_last_error().unwrap();
        let mut third_run = TomlStateStore::open(&path).unwrap();

        // Assert
        assert_eq!(shown.as_deref(), Some("link lost"));
        assert_eq!(third_run.take_last_error().unwrap(), None);
        cleanup(&path);
    }

    #[test]
    fn test_clear_device_id_keeps_last_error() {
        let path = temp_path();
        let mut store = TomlStateStore::open(&path).unwrap();
        store.save_device_id("AA").unwrap();
        store.save_last_error("oops").unwrap();

        store.clear_device_id().unwrap();

        let mut reopened = TomlStateStore::open(&path).unwrap();
        assert_eq!(reopened.load_device_id().unwrap(), None);
        assert_eq!(reopened.take_last_error().unwrap().as_deref(), Some("oops"));
        cleanup(&path);
    }

    #[test]
    fn test_garbage_file_is_a_format_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "device_id = [").unwrap();

        let result = TomlStateStore::open(&path);

        assert!(matches!(result, Err(StoreError::Format(_))));
        cleanup(&path);
    }
}
