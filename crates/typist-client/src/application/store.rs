//! Durable session state.
//!
//! Two facts survive a restart:
//!
//! - the identifier of the last device the user picked, so the next run can
//!   re-attach without opening the chooser, and
//! - the last unrecoverable error, shown once at the next start and then
//!   cleared.
//!
//! The file-backed implementation lives in
//! `infrastructure::storage::state`; [`MemoryStateStore`] keeps everything in
//! memory for tests and `--state-file none` runs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Error type for state persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored state could not be parsed or written.
    #[error("state format error: {0}")]
    Format(String),
}

/// Persistence seam for the session controller.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore: Send + Sync {
    fn load_device_id(&self) -> Result<Option<String>, StoreError>;

    fn save_device_id(&mut self, id: &str) -> Result<(), StoreError>;

    fn clear_device_id(&mut self) -> Result<(), StoreError>;

    fn save_last_error(&mut self, message: &str) -> Result<(), StoreError>;

    /// Returns the stored error, if any, and clears it.
    fn take_last_error(&mut self) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    device_id: Option<String>,
    last_error: Option<String>,
}

/// In-memory store.  Clones share the same state, so a test can keep one
/// clone and hand another to the session.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already remembers `device_id`.
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        let store = Self::new();
        store.state().device_id = Some(device_id.into());
        store
    }

    /// The remembered device id, without going through the trait.
    pub fn device_id(&self) -> Option<String> {
        self.state().device_id.clone()
    }

    /// The stored error, without clearing it.
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStateStore {
    fn load_device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state().device_id.clone())
    }

    fn save_device_id(&mut self, id: &str) -> Result<(), StoreError> {
        self.state().device_id = Some(id.to_string());
        Ok(())
    }

    fn clear_device_id(&mut self) -> Result<(), StoreError> {
        self.state().device_id = None;
        Ok(())
    }

    fn save_last_error(&mut self, message: &str) -> Result<(), StoreError> {
        self.state().last_error = Some(message.to_string());
        Ok(())
    }

    fn take_last_error(&mut self) -> Result<Option<String>, StoreError> {
        Ok(self.state().last_error.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_is_shown_once() {
        // Arrange
        let mut store = MemoryStateStore::new();
        store.save_last_error("boom").unwrap();

        // Act
        let first = store.take_last_error().unwrap();
        let second = store.take_last_error().unwrap();

        // Assert
        assert_eq!(first.as_deref(), Some("boom"));
        assert_eq!(second, None);
    }

    #[test]
    fn test_clones_share_state() {
        let observer = MemoryStateStore::new();
        let mut session_side = observer.clone();

        session_side.save_device_id("AA:BB").unwrap();

        assert_eq!(observer.device_id().as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_clear_device_id() {
        let mut store = MemoryStateStore::with_device_id("AA:BB");
        store.clear_device_id().unwrap();
        assert_eq!(store.load_device_id().unwrap(), None);
    }
}
