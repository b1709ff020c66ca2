//! Concurrency behavior of the token coordinator: refreshes collapse into
//! one backend call per account, abandoned waits never cancel a refresh,
//! and unrelated accounts refresh in parallel.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{Clock, KeyValueStore, PlaintextCipher};
use chrono::{DateTime, TimeZone, Utc};
use core_auth::{
    Account, AccountId, EncryptedTokenStore, IdentityBackend, ProviderKind, RefreshError,
    SignInError, TokenCoordinator, TokenRecord,
};
use core_runtime::{CoreConfig, EventBus};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Barrier, Semaphore};
use tokio::time::{sleep, timeout};

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.rows.lock().unwrap().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> BridgeResult<()> {
        self.rows.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> BridgeResult<Vec<String>> {
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

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Backend that counts refresh calls and can hold each refresh at a gate,
/// a barrier, or a fixed delay before completing.
struct GatedBackend {
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    barrier: Option<Arc<Barrier>>,
    delay: Option<Duration>,
}

impl GatedBackend {
    fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: None,
            barrier: None,
            delay: Some(delay),
        }
    }

    fn with_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Some(gate),
            barrier: None,
            delay: None,
        }
    }

    fn with_barrier(barrier: Arc<Barrier>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: None,
            barrier: Some(barrier),
            delay: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBackend for GatedBackend {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn sign_in_interactive(
        &self,
        _scopes: &BTreeSet<String>,
    ) -> Result<(Account, TokenRecord), SignInError> {
        Err(SignInError::Failed("not used in these tests".to_string()))
    }

    async fn refresh(
        &self,
        _refresh_handle: &str,
        _scopes: &BTreeSet<String>,
    ) -> Result<TokenRecord, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    return Err(RefreshError::Transient {
                        cause: "gate closed".to_string(),
                    })
                }
            }
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }

        Ok(TokenRecord {
            // Overwritten by the coordinator with the real account id
            account_id: AccountId::new("unset"),
            access_token: format!("refreshed-{}", n),
            refresh_handle: String::new(),
            scopes: BTreeSet::new(),
            expires_at: Some(fixed_now() + chrono::Duration::hours(1)),
            token_type: "Bearer".to_string(),
        })
    }

    async fn revoke(&self, _refresh_handle: &str) -> bool {
        true
    }
}

struct NoopRepository;

#[async_trait]
impl core_auth::AccountRepository for NoopRepository {
    async fn mark_account_for_reauthentication(
        &self,
        _account_id: &AccountId,
        _provider: ProviderKind,
    ) {
    }
}

struct Harness {
    coordinator: TokenCoordinator,
    backend: Arc<GatedBackend>,
    store: EncryptedTokenStore,
}

fn harness(backend: GatedBackend) -> Harness {
    let kv = Arc::new(MemoryStore::default());
    let cipher = Arc::new(PlaintextCipher);
    let config = CoreConfig::builder()
        .key_value_store(kv.clone())
        .token_cipher(cipher.clone())
        .clock(Arc::new(FixedClock(fixed_now())))
        .build()
        .unwrap();

    let backend = Arc::new(backend);
    let coordinator = TokenCoordinator::new(
        &config,
        vec![backend.clone() as Arc<dyn IdentityBackend>],
        Arc::new(NoopRepository),
        EventBus::new(16),
    );
    let store = EncryptedTokenStore::new(kv, cipher);

    Harness {
        coordinator,
        backend,
        store,
    }
}

fn account(id: &str) -> Account {
    Account {
        id: AccountId::new(id),
        provider: ProviderKind::Google,
        display_name: None,
        email: None,
    }
}

fn stale_record(id: &str) -> TokenRecord {
    TokenRecord {
        account_id: AccountId::new(id),
        access_token: "expired".to_string(),
        refresh_handle: "refresh-handle".to_string(),
        scopes: BTreeSet::new(),
        expires_at: Some(fixed_now() - chrono::Duration::hours(1)),
        token_type: "Bearer".to_string(),
    }
}

async fn seed_active(h: &Harness, id: &str) {
    h.store.put(&account(id), &stale_record(id)).await.unwrap();
    h.coordinator
        .registry()
        .set_active(ProviderKind::Google, Some(AccountId::new(id)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_getters_share_one_refresh() {
    let h = harness(GatedBackend::with_delay(Duration::from_millis(100)));
    seed_active(&h, "acct-1").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.get_bearer_token(ProviderKind::Google, None).await
        }));
    }

    for task in tasks {
        let token = task.await.unwrap().unwrap();
        assert_eq!(token, "refreshed-1");
    }

    assert_eq!(h.backend.calls(), 1);

    let stored = h
        .store
        .get(&AccountId::new("acct-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "refreshed-1");
    // Handle not rotated by the backend, so the original survives
    assert_eq!(stored.refresh_handle, "refresh-handle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_forced_refreshes_share_one_call() {
    let h = harness(GatedBackend::with_delay(Duration::from_millis(200)));
    seed_active(&h, "acct-1").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator
                .refresh_bearer_token(ProviderKind::Google, None)
                .await
        }));
    }

    for task in tasks {
        let token = task.await.unwrap().unwrap();
        assert_eq!(token, "refreshed-1");
    }

    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_caller_does_not_cancel_refresh() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(GatedBackend::with_gate(gate.clone()));
    seed_active(&h, "acct-1").await;

    let coordinator = h.coordinator.clone();
    let caller = tokio::spawn(async move {
        coordinator.get_bearer_token(ProviderKind::Google, None).await
    });

    // Wait until the refresh is actually in flight, then abandon the caller
    timeout(Duration::from_secs(5), async {
        while h.backend.calls() == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    caller.abort();
    assert!(caller.await.is_err());

    // Let the refresh finish; its result must land in the store
    gate.add_permits(1);
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Some(record)) = h.store.get(&AccountId::new("acct-1")).await {
                if record.access_token == "refreshed-1" {
                    break;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.backend.calls(), 1);

    // The next caller is served from the persisted result
    let token = h
        .coordinator
        .get_bearer_token(ProviderKind::Google, None)
        .await
        .unwrap();
    assert_eq!(token, "refreshed-1");
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_accounts_refresh_in_parallel() {
    // Both refreshes must be in flight at once to pass the barrier; if
    // refreshes were serialized across accounts this would time out
    let barrier = Arc::new(Barrier::new(2));
    let h = harness(GatedBackend::with_barrier(barrier));
    h.store
        .put(&account("acct-a"), &stale_record("acct-a"))
        .await
        .unwrap();
    h.store
        .put(&account("acct-b"), &stale_record("acct-b"))
        .await
        .unwrap();

    let a = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .get_bearer_token(ProviderKind::Google, Some(AccountId::new("acct-a")))
                .await
        })
    };
    let b = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .get_bearer_token(ProviderKind::Google, Some(AccountId::new("acct-b")))
                .await
        })
    };

    let (a, b) = timeout(Duration::from_secs(5), async {
        (a.await.unwrap(), b.await.unwrap())
    })
    .await
    .unwrap();

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.backend.calls(), 2);
}
