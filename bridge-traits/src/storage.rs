//! Durable Key-Value Storage Abstraction
//!
//! Provides a platform-agnostic trait for the encrypted key-value row store
//! that backs credential persistence.

use async_trait::async_trait;

use crate::error::Result;

/// Durable key-value row storage trait
///
/// Abstracts the platform's persistent key-value mechanism:
/// - macOS/iOS: Keychain-backed store
/// - Android: EncryptedSharedPreferences / DataStore
/// - Desktop: OS credential vault or an on-disk store
///
/// Values are opaque strings; callers decide the row format. The store
/// itself performs no encryption — credential fields are encrypted by the
/// caller before they reach `put` (see `TokenCipher`).
///
/// # Requirements
///
/// Implementations MUST:
/// - Persist rows across process restarts
/// - Replace the previous value atomically on `put` for the same key
/// - Support explicit row removal
/// - Never log stored values
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember(store: &dyn KeyValueStore) -> Result<()> {
///     store.put("active_account:google", "acct-123").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a row, replacing any previous value for the key
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a row
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a row
    ///
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// List all keys starting with the given prefix
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if a row exists without retrieving it
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.rows
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_default_has_key() {
        let store = MemoryStore::default();
        assert!(!store.has_key("missing").await.unwrap());

        store.put("present", "value").await.unwrap();
        assert!(store.has_key("present").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_prefix() {
        let store = MemoryStore::default();
        store.put("account:1", "a").await.unwrap();
        store.put("account:2", "b").await.unwrap();
        store.put("active_account:google", "1").await.unwrap();

        let mut keys = store.list_keys("account:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["account:1", "account:2"]);
    }
}
