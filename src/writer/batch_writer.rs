//! The single consumer that turns queued change events into transactions.
//!
//! Each cycle waits for one event, then takes whatever else is already queued
//! without waiting, up to `batch_size`. A sparse stream is therefore written
//! promptly while a burst is folded into few large transactions. The batch is
//! rendered into one `BEGIN; ...; COMMIT` unit, executed with throttling and
//! retries, and the position of its last event is recorded once it committed.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::queue::{event_queue, EventQueue, EventReceiver, TryPop};
use super::retry::RetryPolicy;
use super::rewrite::Rewrites;
use super::throttle::{wait_for_throttle, Throttler};
use super::tracker::PositionTracker;
use crate::config::WriterConfig;
use crate::error::{ErrorHandler, LoggingErrorHandler};
use crate::event::ChangeEvent;
use crate::postgres::TargetDatabase;
use crate::{Error, Result};

const COMPONENT: &str = "binlog_writer";

/// Renders `events` into a single transactional unit.
///
/// Fails on the first event that cannot be rendered; nothing partial is
/// returned.
pub fn render_batch(events: &[ChangeEvent], rewrites: &Rewrites) -> Result<String> {
    let mut query = String::from("BEGIN;\n");

    for event in events {
        let sql = event.as_sql(&rewrites.resolve(event))?;
        query.push_str(&sql);
        query.push_str(";\n");
    }

    query.push_str("COMMIT");
    Ok(query)
}

/// Producer-facing side of a [`BinlogWriter`].
#[derive(Clone)]
pub struct WriterHandle {
    queue: EventQueue,
}

impl WriterHandle {
    /// Queues `events` in order, waiting whenever the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] after [`WriterHandle::stop`].
    pub async fn buffer_events(&self, events: Vec<ChangeEvent>) -> Result<()> {
        self.queue.push_all(events).await
    }

    /// Signals that no more events will be queued. Events already queued are
    /// still written before [`BinlogWriter::run`] returns.
    pub fn stop(&self) {
        if self.queue.close() {
            info!(tag = COMPONENT, "Stop requested, draining queued events");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Applies queued change events to the target in batches.
pub struct BinlogWriter {
    target: Arc<dyn TargetDatabase>,
    tracker: Arc<dyn PositionTracker>,
    throttler: Option<Arc<dyn Throttler>>,
    error_handler: Arc<dyn ErrorHandler>,
    rewrites: Rewrites,
    batch_size: usize,
    retry: RetryPolicy,
    throttle_poll_interval: Duration,
    receiver: EventReceiver,
}

impl BinlogWriter {
    /// Builds a writer and the handle producers use to feed it.
    pub fn new(
        config: &WriterConfig,
        target: Arc<dyn TargetDatabase>,
        tracker: Arc<dyn PositionTracker>,
    ) -> Result<(Self, WriterHandle)> {
        config.validate()?;
        let (queue, receiver) = event_queue(config.batch_size)?;

        let writer = Self {
            target,
            tracker,
            throttler: None,
            error_handler: Arc::new(LoggingErrorHandler),
            rewrites: Rewrites::new(
                config.database_rewrites.clone(),
                config.table_rewrites.clone(),
            ),
            batch_size: config.batch_size,
            retry: config.retry_policy(),
            throttle_poll_interval: config.throttle_poll_interval(),
            receiver,
        };

        Ok((writer, WriterHandle { queue }))
    }

    pub fn with_throttler(mut self, throttler: Arc<dyn Throttler>) -> Self {
        self.throttler = Some(throttler);
        self
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Writes batches until the queue is closed and drained.
    ///
    /// A batch that still fails once the retry budget is spent is reported to
    /// the error handler and ends the writer with that error. The checkpoint is
    /// left at the last committed batch.
    pub async fn run(mut self) -> Result<()> {
        info!(
            tag = COMPONENT,
            batch_size = self.batch_size,
            max_attempts = self.retry.max_attempts,
            "Binlog writer started"
        );

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut batches_written: u64 = 0;

        while let Some(first_event) = self.receiver.pop().await {
            batch.push(first_event);

            while batch.len() < self.batch_size {
                match self.receiver.try_pop() {
                    TryPop::Event(event) => batch.push(event),
                    TryPop::Empty | TryPop::Closed => break,
                }
            }

            let result = self
                .retry
                .run("write events to target", || self.write_events(&batch))
                .await;

            if let Err(err) = result {
                self.error_handler.fatal(COMPONENT, &err);
                return Err(err);
            }

            batches_written += 1;
            batch = Vec::with_capacity(self.batch_size);
        }

        info!(
            tag = COMPONENT,
            batches_written, "Event queue drained, binlog writer stopped"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(tag = COMPONENT, events = events.len()))]
    async fn write_events(&self, events: &[ChangeEvent]) -> Result<()> {
        let Some(last_event) = events.last() else {
            return Ok(());
        };

        wait_for_throttle(self.throttler.as_deref(), self.throttle_poll_interval).await;

        let query = render_batch(events, &self.rewrites)?;

        if let Err(e) = self.target.execute(&query).await {
            return Err(Error::Execute {
                bytes: query.len(),
                source: Box::new(e),
            });
        }

        self.tracker
            .update_last_written_position(last_event.position())
            .await?;

        debug!(
            bytes = query.len(),
            position = %last_event.position(),
            "Batch committed"
        );
        Ok(())
    }
}
