pub mod alerts;
pub mod catalog_sync;
pub mod memory_store;
pub mod steam;

pub use crate::util::db;
