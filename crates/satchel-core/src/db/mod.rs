//! Durable local storage for Satchel

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{LocalStore, StoreName};
