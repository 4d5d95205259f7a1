//! Storage Module - Key-Value Persistenz
//!
//! Dieses Modul stellt die kleine Persistenz-Schnittstelle bereit, über die
//! Geräte-Präferenzen gespeichert werden:
//! - `KeyValueStore` Trait (exists/get/set/update/remove)
//! - In-Memory Store und Namespace-Wrapper
//! - SQLite-basierter Store für Desktop-Hosts

mod kv;
mod sqlite;

pub use kv::{KeyValueStore, MemoryStore, NamespacedStore, StorageError};
pub use sqlite::SqliteStore;
