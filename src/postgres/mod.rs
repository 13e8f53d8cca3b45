pub mod target;

pub use target::{PostgresTarget, TargetDatabase, APPLICATION_NAME};
