//! Bounded, closeable FIFO of change events between producers and the writer.
//!
//! Producers hold cloneable [`EventQueue`] handles and wait when the queue is
//! full. The single [`EventReceiver`] pops events in order and sees
//! [`TryPop::Closed`] / `None` only once the queue has been closed and
//! everything already accepted has been drained.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use crate::event::ChangeEvent;
use crate::{Error, Result};

/// Creates a queue holding at most `capacity` events.
pub fn event_queue(capacity: usize) -> Result<(EventQueue, EventReceiver)> {
    if capacity == 0 {
        return Err(Error::Config(
            "event queue capacity must be greater than zero".to_string(),
        ));
    }

    let (sender, receiver) = mpsc::channel(capacity);
    Ok((
        EventQueue {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        EventReceiver { receiver },
    ))
}

/// Producer side of the queue.
#[derive(Clone)]
pub struct EventQueue {
    sender: Arc<Mutex<Option<mpsc::Sender<ChangeEvent>>>>,
}

impl EventQueue {
    /// Enqueues one event, waiting while the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] once [`EventQueue::close`] has been
    /// called or the receiver is gone.
    pub async fn push(&self, event: ChangeEvent) -> Result<()> {
        let sender = self.current_sender().ok_or(Error::QueueClosed)?;
        sender.send(event).await.map_err(|_| Error::QueueClosed)
    }

    /// Enqueues `events` in order.
    pub async fn push_all(&self, events: Vec<ChangeEvent>) -> Result<()> {
        for event in events {
            self.push(event).await?;
        }
        Ok(())
    }

    /// Closes the queue. Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        let closed = self.lock().take().is_some();
        if closed {
            debug!("Event queue closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn current_sender(&self) -> Option<mpsc::Sender<ChangeEvent>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<ChangeEvent>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Outcome of a non-blocking pop.
#[derive(Debug)]
pub enum TryPop {
    Event(ChangeEvent),
    /// Open, but nothing is ready right now.
    Empty,
    /// Closed and fully drained.
    Closed,
}

/// Consumer side of the queue. There is exactly one.
pub struct EventReceiver {
    receiver: mpsc::Receiver<ChangeEvent>,
}

impl EventReceiver {
    /// Waits for the next event. `None` means closed and drained.
    pub async fn pop(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn try_pop(&mut self) -> TryPop {
        match self.receiver.try_recv() {
            Ok(event) => TryPop::Event(event),
            Err(TryRecvError::Empty) => TryPop::Empty,
            Err(TryRecvError::Disconnected) => TryPop::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BinlogPosition, EventSource, Row};
    use std::time::Duration;

    fn event(offset: u64) -> ChangeEvent {
        let mut row = Row::new();
        row.insert("id".to_string(), offset.into());
        ChangeEvent::insert(
            EventSource::new("db", "t", BinlogPosition::new("mysql-bin.000001", offset)),
            row,
        )
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(event_queue(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fifo_and_drain_after_close() {
        let (queue, mut receiver) = event_queue(4).unwrap();
        queue.push_all(vec![event(1), event(2), event(3)]).await.unwrap();

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());

        assert_eq!(receiver.pop().await.unwrap().position().offset, 1);
        match receiver.try_pop() {
            TryPop::Event(e) => assert_eq!(e.position().offset, 2),
            other => panic!("expected event, got {:?}", other),
        }
        assert_eq!(receiver.pop().await.unwrap().position().offset, 3);
        assert!(matches!(receiver.try_pop(), TryPop::Closed));
        assert!(receiver.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (queue, _receiver) = event_queue(1).unwrap();
        queue.close();
        assert!(matches!(queue.push(event(1)).await, Err(Error::QueueClosed)));
    }

    #[tokio::test]
    async fn test_try_pop_empty_while_open() {
        let (_queue, mut receiver) = event_queue(1).unwrap();
        assert!(matches!(receiver.try_pop(), TryPop::Empty));
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (queue, mut receiver) = event_queue(1).unwrap();
        queue.push(event(1)).await.unwrap();

        let producer = queue.clone();
        let blocked = tokio::spawn(async move { producer.push(event(2)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(receiver.pop().await.unwrap().position().offset, 1);
        blocked.await.unwrap().unwrap();
        assert_eq!(receiver.pop().await.unwrap().position().offset, 2);
    }
}
