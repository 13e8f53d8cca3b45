//! Position trackers: where the writer records the last applied log position.

use futures::future::BoxFuture;
use std::sync::Mutex;
use tracing::debug;

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::event::BinlogPosition;
use crate::{Error, Result};

/// Records the position of the most recently committed event.
///
/// Only the writer calls [`PositionTracker::update_last_written_position`],
/// and only after the batch ending at `position` has committed on the target.
pub trait PositionTracker: Send + Sync {
    fn update_last_written_position<'a>(
        &'a self,
        position: &'a BinlogPosition,
    ) -> BoxFuture<'a, Result<()>>;

    fn last_written_position(&self) -> Option<BinlogPosition>;
}

fn ensure_monotonic(current: Option<&BinlogPosition>, next: &BinlogPosition) -> Result<()> {
    match current {
        Some(current) if next < current => Err(Error::CheckpointRegression {
            current: current.to_string(),
            attempted: next.to_string(),
        }),
        _ => Ok(()),
    }
}

/// In-memory tracker.
#[derive(Debug, Default)]
pub struct StateTracker {
    last_written: Mutex<Option<BinlogPosition>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a previously recorded position.
    pub fn resume_from(position: BinlogPosition) -> Self {
        Self {
            last_written: Mutex::new(Some(position)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<BinlogPosition>> {
        self.last_written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PositionTracker for StateTracker {
    fn update_last_written_position<'a>(
        &'a self,
        position: &'a BinlogPosition,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut last_written = self.lock();
            ensure_monotonic(last_written.as_ref(), position)?;
            *last_written = Some(position.clone());
            Ok(())
        })
    }

    fn last_written_position(&self) -> Option<BinlogPosition> {
        self.lock().clone()
    }
}

/// Tracker that persists every update through a [`CheckpointManager`].
///
/// The in-memory position only moves once the checkpoint file has been
/// replaced, so [`PositionTracker::last_written_position`] never reports a
/// position that would be lost by a crash.
pub struct CheckpointTracker {
    manager: CheckpointManager,
    state: tokio::sync::Mutex<Option<Checkpoint>>,
    last_written: Mutex<Option<BinlogPosition>>,
}

impl CheckpointTracker {
    /// Opens the tracker, picking up any checkpoint already on disk.
    pub async fn open(manager: CheckpointManager) -> Result<Self> {
        let existing = manager.load().await?;
        let last_written = existing.as_ref().map(|c| c.position.clone());
        debug!(
            path = %manager.path().display(),
            position = ?last_written,
            "Checkpoint tracker opened"
        );
        Ok(Self {
            manager,
            state: tokio::sync::Mutex::new(existing),
            last_written: Mutex::new(last_written),
        })
    }

    pub async fn checkpoint(&self) -> Option<Checkpoint> {
        self.state.lock().await.clone()
    }

    fn lock_last_written(&self) -> std::sync::MutexGuard<'_, Option<BinlogPosition>> {
        self.last_written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PositionTracker for CheckpointTracker {
    fn update_last_written_position<'a>(
        &'a self,
        position: &'a BinlogPosition,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            ensure_monotonic(state.as_ref().map(|c| &c.position), position)?;

            let batch_count = state.as_ref().map_or(0, |c| c.batch_count) + 1;
            let checkpoint = Checkpoint::new(position.clone(), batch_count);
            self.manager.save(&checkpoint).await?;

            debug!(position = %position, batch_count, "Checkpoint advanced");
            *self.lock_last_written() = Some(position.clone());
            *state = Some(checkpoint);
            Ok(())
        })
    }

    fn last_written_position(&self) -> Option<BinlogPosition> {
        self.lock_last_written().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pos(offset: u64) -> BinlogPosition {
        BinlogPosition::new("mysql-bin.000001", offset)
    }

    #[tokio::test]
    async fn test_state_tracker_is_monotonic() {
        let tracker = StateTracker::new();
        assert!(tracker.last_written_position().is_none());

        tracker.update_last_written_position(&pos(10)).await.unwrap();
        tracker.update_last_written_position(&pos(10)).await.unwrap();
        tracker.update_last_written_position(&pos(12)).await.unwrap();

        let err = tracker
            .update_last_written_position(&pos(11))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheckpointRegression { .. }));
        assert_eq!(tracker.last_written_position(), Some(pos(12)));
    }

    #[tokio::test]
    async fn test_checkpoint_tracker_persists_and_resumes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.json");

        {
            let tracker = CheckpointTracker::open(CheckpointManager::new(&path))
                .await
                .unwrap();
            assert!(tracker.last_written_position().is_none());

            tracker.update_last_written_position(&pos(5)).await.unwrap();
            tracker.update_last_written_position(&pos(9)).await.unwrap();
        }

        let tracker = CheckpointTracker::open(CheckpointManager::new(&path))
            .await
            .unwrap();
        assert_eq!(tracker.last_written_position(), Some(pos(9)));
        assert_eq!(tracker.checkpoint().await.unwrap().batch_count, 2);

        assert!(tracker.update_last_written_position(&pos(3)).await.is_err());
        let on_disk = CheckpointManager::new(&path).load().await.unwrap().unwrap();
        assert_eq!(on_disk.position, pos(9));
    }
}
