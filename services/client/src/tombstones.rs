use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Per-user set of deleted image ids.
///
/// The remote delete call can fail after the user already removed the image
/// from their view, so the client keeps its own record of every deletion and
/// filters listings through it. Entries are only ever added; the set is
/// cleared as a whole by an explicit reset.
pub trait TombstoneStore: Send + Sync {
    /// Load the deleted-id set for a user. A missing or unreadable store
    /// reads as empty.
    fn load(&self, user_id: &str) -> HashSet<String>;

    /// Record one deleted image id.
    fn record(&self, user_id: &str, image_id: &str) -> Result<()>;

    /// Drop every tombstone for a user.
    fn reset(&self, user_id: &str) -> Result<()>;
}

/// Tombstones kept as one JSON array file per user under a state directory.
pub struct FileTombstoneStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileTombstoneStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("deleted-{safe}.json"))
    }

    fn read_set(&self, user_id: &str) -> HashSet<String> {
        let path = self.path_for(user_id);
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt tombstone file, treating as empty");
                HashSet::new()
            }),
            Err(_) => HashSet::new(),
        }
    }

    fn write_set(&self, user_id: &str, set: &HashSet<String>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(user_id);
        let raw = serde_json::to_string(set).context("Failed to serialize tombstones")?;
        fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl TombstoneStore for FileTombstoneStore {
    fn load(&self, user_id: &str) -> HashSet<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_set(user_id)
    }

    fn record(&self, user_id: &str, image_id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut set = self.read_set(user_id);
        if set.insert(image_id.to_string()) {
            self.write_set(user_id, &set)?;
        }
        Ok(())
    }

    fn reset(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path_for(user_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}
