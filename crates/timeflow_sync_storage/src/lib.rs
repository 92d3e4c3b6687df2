//! # TimeFlow Sync Storage
//!
//! Durable key-value records for the TimeFlow sync engine.
//!
//! The sync engine keeps two small records (settings and sync state), each
//! under its own key. Stores treat values as **opaque strings** - they do not
//! interpret the JSON the engine writes.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral engines
//! - [`FileStore`] - One file per key inside a directory, replaced atomically
//!
//! ## Example
//!
//! ```rust
//! use timeflow_sync_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.put("timeflow.sync.state", "{}").unwrap();
//! assert_eq!(store.get("timeflow.sync.state").unwrap().as_deref(), Some("{}"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
