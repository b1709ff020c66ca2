//! Active Account Registry
//!
//! Tracks which account, if any, is currently selected for each provider.
//! The selection is persisted through the host `KeyValueStore` so it
//! survives restarts, cached in memory for cheap reads, and every change
//! is broadcast to interested subscribers.
//!
//! Setting the slot to the value it already holds is an exact no-op: no
//! write, no notification.

use crate::error::Result;
use crate::types::{AccountId, ProviderKind};
use bridge_traits::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Key prefix for active account slots in the key-value store.
const KEY_PREFIX: &str = "active_account:";

/// Buffer size for the change notification channel.
const CHANGE_BUFFER_SIZE: usize = 16;

/// Notification emitted when a provider's active account slot changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAccountChanged {
    /// The provider whose slot changed.
    pub provider: ProviderKind,
    /// The new active account, or `None` when the slot was cleared.
    pub account_id: Option<AccountId>,
}

/// Per-provider active account slots (nullable, persisted).
pub struct ActiveAccountRegistry {
    kv: Arc<dyn KeyValueStore>,
    // Outer Option distinguishes "not yet loaded" from "loaded, empty"
    cache: RwLock<HashMap<ProviderKind, Option<AccountId>>>,
    changes: broadcast::Sender<ActiveAccountChanged>,
}

impl ActiveAccountRegistry {
    /// Create a registry over the given persistence.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER_SIZE);
        Self {
            kv,
            cache: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Get the active account for a provider, if one is set.
    ///
    /// Reads through the in-memory cache; the first call per provider
    /// loads the persisted value.
    pub async fn get_active(&self, provider: ProviderKind) -> Result<Option<AccountId>> {
        {
            let cache = self.cache.read().await;
            if let Some(slot) = cache.get(&provider) {
                return Ok(slot.clone());
            }
        }

        let slot = self.load_persisted(provider).await?;

        let mut cache = self.cache.write().await;
        cache.entry(provider).or_insert_with(|| slot.clone());
        Ok(slot)
    }

    /// Set or clear the active account for a provider.
    ///
    /// When the slot already holds the requested value nothing is written
    /// and no notification is sent. Otherwise the new value is persisted,
    /// the cache updated, and a change notification broadcast.
    pub async fn set_active(
        &self,
        provider: ProviderKind,
        account_id: Option<AccountId>,
    ) -> Result<()> {
        // Write lock held across the whole operation so concurrent setters
        // serialize and the no-op check stays accurate
        let mut cache = self.cache.write().await;

        let current = match cache.get(&provider) {
            Some(slot) => slot.clone(),
            None => self.load_persisted(provider).await?,
        };

        if current == account_id {
            debug!(
                provider = %provider.as_str(),
                "Active account unchanged, skipping write"
            );
            cache.insert(provider, current);
            return Ok(());
        }

        let key = storage_key(provider);
        match &account_id {
            Some(id) => self.kv.put(&key, id.as_str()).await?,
            None => self.kv.remove(&key).await?,
        }

        cache.insert(provider, account_id.clone());

        info!(
            provider = %provider.as_str(),
            has_account = account_id.is_some(),
            "Active account changed"
        );

        // Absence of subscribers is fine
        let _ = self.changes.send(ActiveAccountChanged {
            provider,
            account_id,
        });

        Ok(())
    }

    /// Subscribe to active account changes.
    pub fn changes(&self) -> broadcast::Receiver<ActiveAccountChanged> {
        self.changes.subscribe()
    }

    async fn load_persisted(&self, provider: ProviderKind) -> Result<Option<AccountId>> {
        let value = self.kv.get(&storage_key(provider)).await?;
        Ok(value.map(AccountId::new))
    }
}

fn storage_key(provider: ProviderKind) -> String {
    format!("{}{}", KEY_PREFIX, provider.as_str())
}
