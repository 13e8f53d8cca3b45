pub mod batch_writer;
pub mod queue;
pub mod retry;
pub mod rewrite;
pub mod throttle;
pub mod tracker;

pub use batch_writer::{render_batch, BinlogWriter, WriterHandle};
pub use queue::{event_queue, EventQueue, EventReceiver, TryPop};
pub use retry::RetryPolicy;
pub use rewrite::Rewrites;
pub use throttle::{wait_for_throttle, PauseThrottler, Throttler};
pub use tracker::{CheckpointTracker, PositionTracker, StateTracker};
