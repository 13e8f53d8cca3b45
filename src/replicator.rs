use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointManager;
use crate::event::BinlogPosition;
use crate::ingest::{self, IngestStats};
use crate::postgres::PostgresTarget;
use crate::writer::{BinlogWriter, CheckpointTracker, PositionTracker, WriterHandle};
use crate::{Config, Error, Result};

/// Wires the input, the writer, the target and the checkpoint together.
pub struct Replicator {
    config: Config,
    input: Option<PathBuf>,
    reset_checkpoint: bool,
}

impl Replicator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            input: None,
            reset_checkpoint: false,
        }
    }

    /// Reads events from `path` instead of stdin.
    pub fn with_input(mut self, path: Option<PathBuf>) -> Self {
        self.input = path;
        self
    }

    /// Discards any existing checkpoint before starting.
    pub fn with_reset_checkpoint(mut self, reset: bool) -> Self {
        self.reset_checkpoint = reset;
        self
    }

    pub async fn run(self) -> Result<()> {
        info!("Replicator starting");
        self.config.validate()?;

        let manager = CheckpointManager::new(&self.config.checkpoint.file);
        if self.reset_checkpoint {
            manager.delete().await?;
        }
        let tracker = Arc::new(CheckpointTracker::open(manager).await?);
        let resume_after = tracker.last_written_position();
        match &resume_after {
            Some(position) => info!("Resuming after position {}", position),
            None => info!("No checkpoint found, applying input from the beginning"),
        }

        let target = Arc::new(PostgresTarget::connect(&self.config.target).await?);
        let (writer, handle) =
            BinlogWriter::new(&self.config.writer, target.clone(), tracker.clone())?;
        let mut writer_task = tokio::spawn(writer.run());

        let ingest = self.ingest(&handle, resume_after);
        let outcome = tokio::select! {
            result = ingest => Some(result),
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, draining queued events");
                None
            }
            result = &mut writer_task => {
                // The writer only returns early on a fatal error.
                error!("Writer stopped before input ended");
                join_result(result)?;
                return Err(Error::Shutdown);
            }
        };

        handle.stop();
        let writer_result = join_result(writer_task.await);

        if let Ok(target) = Arc::try_unwrap(target) {
            target.close().await?;
        }

        match tracker.last_written_position() {
            Some(position) => info!("Replicator stopped at position {}", position),
            None => info!("Replicator stopped, nothing was written"),
        }

        writer_result?;
        match outcome {
            Some(Ok(stats)) => {
                info!(
                    buffered = stats.buffered,
                    skipped = stats.skipped,
                    "Replication complete"
                );
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    async fn ingest(
        &self,
        handle: &WriterHandle,
        resume_after: Option<BinlogPosition>,
    ) -> Result<IngestStats> {
        match &self.input {
            Some(path) => {
                info!("Reading change events from {:?}", path);
                let file = tokio::fs::File::open(path).await?;
                ingest::forward(file, handle, resume_after.as_ref()).await
            }
            None => {
                info!("Reading change events from stdin");
                ingest::forward(tokio::io::stdin(), handle, resume_after.as_ref()).await
            }
        }
    }
}

fn join_result(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| {
        warn!("Writer task did not complete: {}", e);
        Error::Task(e.to_string())
    })?
}
