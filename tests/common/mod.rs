#![allow(dead_code)]

use futures::future::BoxFuture;
use pg_apply::config::{
    CheckpointConfig, Config, SslMode, TargetConfig, WriterConfig,
};
use pg_apply::event::{BinlogPosition, ChangeEvent, EventSource, Row};
use pg_apply::postgres::TargetDatabase;
use pg_apply::writer::{PositionTracker, StateTracker};
use pg_apply::{Error, ErrorHandler, Result};
use serde_json::{json, Value};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BINLOG_FILE: &str = "mysql-bin.000001";

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let target = TargetConfig {
        host: env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_PG_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .unwrap_or(5432),
        database: env::var("TEST_PG_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
        username: env::var("TEST_PG_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("TEST_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        connect_timeout_secs: 30,
        ssl_mode: SslMode::Disable,
    };

    Config {
        target,
        writer: WriterConfig::default(),
        checkpoint: CheckpointConfig::default(),
    }
}

pub fn writer_config(batch_size: usize, write_retries: usize) -> WriterConfig {
    WriterConfig {
        batch_size,
        write_retries,
        throttle_poll_interval_ms: 5,
        ..WriterConfig::default()
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row must be a JSON object, got {}", other),
    }
}

pub fn insert_event(database: &str, table: &str, offset: u64) -> ChangeEvent {
    ChangeEvent::insert(
        EventSource::new(database, table, BinlogPosition::new(BINLOG_FILE, offset)),
        row(json!({"id": offset})),
    )
}

/// Statements of one executed unit, without the transaction markers.
pub fn statements(unit: &str) -> Vec<String> {
    let body = unit
        .strip_prefix("BEGIN;\n")
        .and_then(|rest| rest.strip_suffix("COMMIT"))
        .unwrap_or_else(|| panic!("unit is not wrapped in a transaction: {}", unit));

    body.split(";\n")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Target that records every unit it is asked to execute.
#[derive(Default)]
pub struct MockTarget {
    executed: Mutex<Vec<String>>,
    failures_remaining: AtomicUsize,
    always_fail: bool,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `failures` executions, then succeeds.
    pub fn failing(failures: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Every unit submitted, including failed attempts.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl TargetDatabase for MockTarget {
    fn execute<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(query.to_string());

            let injected = self.always_fail
                || self
                    .failures_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if injected {
                return Err(Error::Connection("injected failure".to_string()));
            }
            Ok(())
        })
    }
}

/// Tracker that keeps the full history of recorded positions.
#[derive(Default)]
pub struct RecordingTracker {
    state: StateTracker,
    updates: Mutex<Vec<BinlogPosition>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<BinlogPosition> {
        self.updates.lock().unwrap().clone()
    }
}

impl PositionTracker for RecordingTracker {
    fn update_last_written_position<'a>(
        &'a self,
        position: &'a BinlogPosition,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.update_last_written_position(position).await?;
            self.updates.lock().unwrap().push(position.clone());
            Ok(())
        })
    }

    fn last_written_position(&self) -> Option<BinlogPosition> {
        self.state.last_written_position()
    }
}

#[derive(Default)]
pub struct RecordingErrorHandler {
    fatals: Mutex<Vec<String>>,
}

impl RecordingErrorHandler {
    pub fn fatals(&self) -> Vec<String> {
        self.fatals.lock().unwrap().clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn fatal(&self, component: &str, err: &Error) {
        self.fatals
            .lock()
            .unwrap()
            .push(format!("{}: {}", component, err));
    }
}
