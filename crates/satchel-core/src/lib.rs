//! satchel-core - Core library for Satchel
//!
//! This crate contains the client-side durability layer that sits between the
//! school application and its hosted backend: a durable local store, the
//! pending-mutation queue, cache reconciliation, conflict registry, and the
//! offline-aware dispatcher that ties them together.

pub mod cache;
pub mod client;
pub mod config;
pub mod conflicts;
pub mod db;
pub mod error;
pub mod models;
pub mod network;
pub mod queue;
pub mod remote;
pub mod util;

pub use client::{DispatchResult, OfflineClient, SyncReport};
pub use error::{Error, Result};
pub use models::{CacheMutation, Conflict, Operation, OperationId, QueuedOperation};
