pub mod cache;
pub mod common;
pub mod conflicts;
pub mod queue;
pub mod sync;
