//! Checkpoint persistence for resumable replication.
//!
//! A checkpoint records the source log position through which every change has
//! been committed to the target. After a restart, reading resumes right after
//! that position.
//!
//! # Example
//!
//! ```rust,no_run
//! use pg_apply::checkpoint::{Checkpoint, CheckpointManager};
//! use pg_apply::event::BinlogPosition;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("checkpoint.json");
//!
//!     // Load existing checkpoint
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming after position: {}", checkpoint.position);
//!     }
//!
//!     // Save new checkpoint
//!     let checkpoint = Checkpoint::new(BinlogPosition::new("mysql-bin.000003", 1542), 12);
//!     manager.save(&checkpoint).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::event::BinlogPosition;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Represents a checkpoint in the source change stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Position of the last event of the last committed batch
    pub position: BinlogPosition,
    /// The timestamp when this checkpoint was created
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Number of batches committed since the checkpoint file was created
    pub batch_count: u64,
}

impl Checkpoint {
    /// Creates a new checkpoint with the current timestamp.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pg_apply::checkpoint::Checkpoint;
    /// use pg_apply::event::BinlogPosition;
    ///
    /// let checkpoint = Checkpoint::new(BinlogPosition::new("mysql-bin.000001", 4), 1);
    /// assert_eq!(checkpoint.position.offset, 4);
    /// assert_eq!(checkpoint.batch_count, 1);
    /// ```
    pub fn new(position: BinlogPosition, batch_count: u64) -> Self {
        Self {
            position,
            timestamp: chrono::Utc::now(),
            batch_count,
        }
    }
}

/// Manages checkpoint persistence to disk.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// checkpoint, so a crash never leaves a partially written file behind.
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Loads checkpoint from disk if it exists.
    ///
    /// Returns `None` if the checkpoint file doesn't exist, which typically
    /// means this is the first run or the checkpoint was deleted.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read or does not contain a
    /// valid checkpoint.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        if !fs::try_exists(&self.file_path).await? {
            debug!("No checkpoint file found at {:?}", self.file_path);
            return Ok(None);
        }

        match fs::read_to_string(&self.file_path).await {
            Ok(content) => match serde_json::from_str::<Checkpoint>(&content) {
                Ok(checkpoint) => {
                    info!(
                        "Loaded checkpoint: position={}, timestamp={}",
                        checkpoint.position, checkpoint.timestamp
                    );
                    Ok(Some(checkpoint))
                }
                Err(e) => {
                    error!("Failed to parse checkpoint file: {}", e);
                    Err(Error::InvalidMessage {
                        message: format!("Invalid checkpoint file: {}", e),
                    })
                }
            },
            Err(e) => {
                error!("Failed to read checkpoint file: {}", e);
                Err(Error::Io(e))
            }
        }
    }

    /// Saves checkpoint to disk atomically.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!("Saving checkpoint: position={}", checkpoint.position);

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!("Checkpoint saved successfully");
        Ok(())
    }

    /// Deletes the checkpoint file if it exists, so the next run starts from
    /// the beginning of the input.
    pub async fn delete(&self) -> Result<()> {
        if fs::try_exists(&self.file_path).await? {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted checkpoint file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checkpoint_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");

        let manager = CheckpointManager::new(&checkpoint_path);

        // Initially no checkpoint
        assert!(manager.load().await.unwrap().is_none());

        let checkpoint = Checkpoint::new(BinlogPosition::new("mysql-bin.000002", 5678), 100);
        manager.save(&checkpoint).await.unwrap();

        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.position, BinlogPosition::new("mysql-bin.000002", 5678));
        assert_eq!(loaded.batch_count, 100);
        assert!(!checkpoint_path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");
        std::fs::write(&checkpoint_path, "{ not json").unwrap();

        let manager = CheckpointManager::new(&checkpoint_path);
        assert!(matches!(
            manager.load().await,
            Err(Error::InvalidMessage { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(temp_dir.path().join("checkpoint.json"));

        manager.delete().await.unwrap();
        manager
            .save(&Checkpoint::new(BinlogPosition::new("mysql-bin.000001", 1), 1))
            .await
            .unwrap();
        assert!(manager.path().exists());
        manager.delete().await.unwrap();
        assert!(!manager.path().exists());
        assert!(manager.load().await.unwrap().is_none());
    }
}
