//! Local durable storage of the rating record (one JSON file per identity)

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rating::RatingRecord;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Local storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `guest.json` for anonymous play, `user-<id>.json` otherwise.
    pub fn for_identity(dir: &Path, user_id: Option<i64>) -> Self {
        let file = match user_id {
            Some(id) => format!("user-{id}.json"),
            None => "guest.json".to_string(),
        };
        Self::new(dir.join(file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<RatingRecord>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write through a temp file so a crash never leaves a torn record.
    pub fn save(&self, record: &RatingRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Fresh path under the system temp dir.
    pub fn temp_path(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir()
            .join(format!("gambit-{name}-{ts}"))
            .join("ratings.json")
    }
}
