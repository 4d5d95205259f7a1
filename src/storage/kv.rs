//! Key-Value Store Schnittstelle
//!
//! Werte werden als JSON gehalten, damit Hosts mit String-basierten Stores
//! (z.B. localStorage) dieselben Daten lesen können.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create storage directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

// ============================================================================
// KEY VALUE STORE
// ============================================================================

/// Persistenz-Schnittstelle, die vom Host bereitgestellt wird
pub trait KeyValueStore: Send + Sync {
    /// Prüft ob ein Schlüssel existiert
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Liest einen Wert (None wenn nicht vorhanden)
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Schreibt einen Wert (legt den Schlüssel bei Bedarf an)
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Überschreibt einen bestehenden Wert
    ///
    /// Schlägt mit `KeyNotFound` fehl, wenn der Schlüssel nicht existiert.
    fn update(&self, key: &str, value: Value) -> Result<(), StorageError> {
        if !self.exists(key)? {
            tracing::error!("Key \"{}\" does not exist in store", key);
            return Err(StorageError::KeyNotFound(key.to_string()));
        }
        self.set(key, value)
    }

    /// Entfernt einen Wert
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Flüchtiger Store (Tests und Hosts ohne Persistenz)
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// NAMESPACED STORE
// ============================================================================

/// Präfixt jeden Schlüssel mit `<namespace>:`
///
/// Der CRM-Host teilt seinen Store mit anderen Widgets, daher dürfen
/// unsere Schlüssel nicht roh geschrieben werden.
#[derive(Clone)]
pub struct NamespacedStore {
    inner: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl NamespacedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

impl KeyValueStore for NamespacedStore {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(&self.key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(&self.key(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.inner.set(&self.key(key), value)
    }

    fn update(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.inner.update(&self.key(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(&self.key(key))
    }
}

// ============================================================================
// TESTS
// ============================================================================
