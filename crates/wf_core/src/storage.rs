use crate::Result;

/// Raw durable key-value storage.
///
/// Values are opaque strings (JSON in practice). Implementations are
/// synchronous and use interior mutability so one store can be shared.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Every key currently stored
    fn keys(&self) -> Result<Vec<String>>;

    /// Bytes currently used, counting keys and values
    fn used_bytes(&self) -> Result<usize>;
}
