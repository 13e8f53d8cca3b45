pub mod render;
pub mod types;

pub use types::{BinlogPosition, ChangeEvent, ChangeOperation, EventSource, Row, TableRef};
