use crate::checkpoint::{Checkpoint, CheckpointMeta, CheckpointResult, CheckpointStore};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores one JSON checkpoint file per batch under a directory
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> CheckpointResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", batch_id))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, batch_id: &str, index: usize, meta: CheckpointMeta) -> CheckpointResult<()> {
        let checkpoint = Checkpoint {
            batch_id: batch_id.to_string(),
            last_completed_index: index,
            consecutive_units_since_restart: meta.consecutive_units_since_restart,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_vec_pretty(&checkpoint)?;
        let target = self.path_for(batch_id);
        let tmp = self.dir.join(format!("{}.json.tmp", batch_id));

        // Rename is atomic on the same filesystem; readers never see a torn file
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &target)?;

        tracing::debug!("Checkpoint {} advanced to index {}", batch_id, index);
        Ok(())
    }

    fn load(&self, batch_id: &str) -> CheckpointResult<Option<Checkpoint>> {
        let bytes = match fs::read(self.path_for(batch_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn clear(&self, batch_id: &str) -> CheckpointResult<()> {
        match fs::remove_file(self.path_for(batch_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
