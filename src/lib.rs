//! Batched, checkpointed application of replicated row changes to PostgreSQL.
//!
//! Producers hand [`event::ChangeEvent`]s to a [`writer::WriterHandle`]. A single
//! [`writer::BinlogWriter`] drains them into bounded batches, commits each batch
//! as one transaction and records the position of its last event so a restart
//! resumes right after it.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod replicator;
pub mod writer;

pub mod postgres;

pub use config::Config;
pub use error::{Error, ErrorHandler, LoggingErrorHandler, Result};
pub use replicator::Replicator;
