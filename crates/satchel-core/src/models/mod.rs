//! Data models for Satchel

mod conflict;
mod mutation;
mod operation;

pub use conflict::Conflict;
pub use mutation::{merge_filter, CacheMutation, Filter};
pub use operation::{Operation, OperationId, QueuedOperation, UploadOptions};
