use std::collections::HashMap;
use std::sync::RwLock;
use wf_core::{Error, KeyValueStore, Result};

/// Map-backed store. Nothing survives the process, but the quota is
/// enforced with the same byte accounting as the sqlite store so failure
/// paths can be tested.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    fn poisoned() -> Error {
        Error::Storage("memory store lock poisoned".to_string())
    }
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

fn check_quota(
    entries: &HashMap<String, String>,
    quota: Option<usize>,
    key: &str,
    value: &str,
) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let used: usize = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
    let replaced = entries.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
    let needed = used - replaced + entry_size(key, value);
    if needed > quota {
        return Err(Error::QuotaExceeded { needed, quota });
    }
    Ok(())
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        check_quota(&entries, self.quota, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.keys().cloned().collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let store = InMemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.used_bytes().unwrap(), 2);

        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        // removing again is fine
        store.remove("a").unwrap();
    }

    #[test]
    fn test_quota_rejects_and_keeps_old_value() {
        let store = InMemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let err = store.set("k", "0123456789").unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { quota: 10, .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));

        // replacing counts only the new value
        store.set("k", "123456789").unwrap();
    }
}
