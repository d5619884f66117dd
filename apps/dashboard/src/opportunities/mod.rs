//! Per-record opportunity state and its local persistence.

pub mod models;
pub mod storage;
pub mod store;

pub use models::{ChatMessage, Counts, Flags};
pub use storage::{JsonFileStore, KvStore, MemoryStore, StorageError};
pub use store::OpportunityStore;
