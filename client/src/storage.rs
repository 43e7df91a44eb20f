//! Durable session storage.
//!
//! A single JSON document holds the whole session (`{token, user}`). A
//! document that fails to decode is treated as absent and purged, so a
//! corrupt file can never wedge startup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::Session;

/// Errors from the storage layer itself.
///
/// Callers mostly ignore these (a failed save degrades to a non-persistent
/// session), but they are surfaced for logging.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("session storage io: {0}")]
    Io(#[from] std::io::Error),

    /// The session could not be serialized
    #[error("session encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where sessions are persisted between runs.
pub trait SessionStorage: Send + Sync {
    /// Load the persisted session, if any.
    ///
    /// A corrupt or partial document counts as no session and is removed
    /// as a side effect.
    fn load(&self) -> Option<Session>;

    /// Persist the session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the session cannot be written.
    fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove the persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on filesystem failure other than the file
    /// already being gone.
    fn clear(&self) -> Result<(), StorageError>;
}

/// File-backed [`SessionStorage`].
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Store sessions at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Option<Session> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session file unreadable");
                return None;
            },
        };

        match serde_json::from_slice::<Session>(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "purging corrupt session file"
                );
                if let Err(e) = self.clear() {
                    tracing::warn!(error = %e, "failed to purge corrupt session file");
                }
                None
            },
        }
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(session)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
