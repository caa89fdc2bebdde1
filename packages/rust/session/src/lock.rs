//! Session lock file.
//!
//! Written after a browser resource is acquired and removed once it is
//! released. A lock found at startup means the previous process ended
//! without releasing its resource.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jobpilot_shared::{JobPilotError, Result};

use crate::browser::ResourceHandle;

const LOCK_FILE_NAME: &str = "session.lock.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLock {
    pub session_id: Uuid,
    pub handle: ResourceHandle,
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

impl SessionLock {
    pub fn new(session_id: Uuid, handle: ResourceHandle) -> Self {
        Self {
            session_id,
            handle,
            pid: std::process::id(),
            created_at: Utc::now(),
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE_NAME)
    }

    /// Read the lock in `dir`. A corrupt lock is discarded with a warning.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobPilotError::io(&path, e)),
        };
        match serde_json::from_str(&content) {
            Ok(lock) => Ok(Some(lock)),
            Err(e) => {
                tracing::warn!(?path, error = %e, "discarding unreadable session lock");
                Self::remove(dir)?;
                Ok(None)
            }
        }
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| JobPilotError::io(dir, e))?;
        let path = Self::path(dir);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| JobPilotError::validation(format!("failed to serialize lock: {e}")))?;
        std::fs::write(&path, json).map_err(|e| JobPilotError::io(&path, e))
    }

    /// Remove the lock in `dir`. Missing locks are ignored.
    pub fn remove(dir: &Path) -> Result<()> {
        let path = Self::path(dir);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobPilotError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("jp-lock-test-{}", Uuid::now_v7()))
    }

    #[test]
    fn write_read_remove() {
        let dir = temp_dir();
        assert_eq!(SessionLock::read(&dir).unwrap(), None);

        let lock = SessionLock::new(
            Uuid::now_v7(),
            ResourceHandle {
                backend: "webdriver".into(),
                id: "s-1".into(),
                endpoint: "http://localhost:9515".into(),
            },
        );
        lock.write(&dir).unwrap();
        assert_eq!(SessionLock::read(&dir).unwrap(), Some(lock));

        SessionLock::remove(&dir).unwrap();
        SessionLock::remove(&dir).unwrap();
        assert_eq!(SessionLock::read(&dir).unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_lock_is_discarded() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(SessionLock::path(&dir), "{not json").unwrap();
        assert_eq!(SessionLock::read(&dir).unwrap(), None);
        assert!(!SessionLock::path(&dir).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
