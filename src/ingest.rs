//! JSON-lines change event input.
//!
//! Each non-blank line is one [`ChangeEvent`]. Events at or before the resume
//! position were already committed by a previous run and are skipped.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::event::{BinlogPosition, ChangeEvent};
use crate::writer::WriterHandle;
use crate::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Events handed to the writer.
    pub buffered: u64,
    /// Events skipped because they precede the resume position.
    pub skipped: u64,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_line(line: &str, line_number: u64) -> Result<Option<ChangeEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| Error::InvalidMessage {
            message: format!("line {}: {}", line_number, e),
        })
}

/// Reads events from `reader` until end of input and queues them on `handle`.
pub async fn forward<R>(
    reader: R,
    handle: &WriterHandle,
    resume_after: Option<&BinlogPosition>,
) -> Result<IngestStats>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    let mut stats = IngestStats::default();
    let mut line_number = 0;

    while let Some(line) = lines.next().await {
        line_number += 1;
        let Some(event) = parse_line(&line?, line_number)? else {
            continue;
        };

        if resume_after.is_some_and(|resume| event.position() <= resume) {
            stats.skipped += 1;
            continue;
        }

        debug!(position = %event.position(), op = ?event.op(), "Queueing event");
        handle.buffer_events(vec![event]).await?;
        stats.buffered += 1;
    }

    info!(
        buffered = stats.buffered,
        skipped = stats.skipped,
        "End of input reached"
    );
    Ok(stats)
}
