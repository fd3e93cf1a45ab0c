// # State Store Trait
//
// Defines the raw persistence interface underneath the config store.
//
// ## Purpose
//
// The state store holds the "what to watch and how often" settings so they
// survive restarts of the host process. Values are opaque JSON documents
// addressed by key; typing and defaults are layered on top by
// `ConfigStore`.
//
// ## Implementations
//
// - File-based: single JSON document with atomic writes
// - In-memory: tests and ephemeral runs
//
// ## Usage
//
// ```rust,ignore
// use slotwatch_core::StateStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     store.save("interval", serde_json::json!(10)).await?;
//     let interval = store.load("interval").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::Value;

/// Trait for raw key/value persistence
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Consistency
///
/// Last-write-wins per key. There is no cross-key transactionality: the
/// watch-list and the monitor settings are independent keys and may be
/// observed in any interleaving.
///
/// # Responsibilities
///
/// A state store persists values and nothing else. It must not:
/// - Decide defaults (owned by `ConfigStore`)
/// - Interpret the watch-list or monitor settings (owned by `MonitorEngine`)
/// - Spawn background tasks; if periodic flushing is needed, the owner calls
///   `flush()`
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Value))`: The stored value
    /// - `Ok(None)`: Nothing stored under this key
    /// - `Err(Error)`: Storage fault
    async fn load(&self, key: &str) -> Result<Option<Value>, crate::Error>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Stored (and durable, for persistent implementations)
    /// - `Err(Error)`: Storage fault
    async fn save(&self, key: &str, value: Value) -> Result<(), crate::Error>;

    /// Remove the value stored under `key`
    ///
    /// Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), crate::Error>;

    /// List all keys in the store
    async fn keys(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    ///
    /// Some implementations may buffer writes. This ensures all changes are
    /// flushed to persistent storage.
    async fn flush(&self) -> Result<(), crate::Error>;
}
