//! In-memory dialog state: at most one pending multi-step operation per owner.
//!
//! Steps are tagged enum variants, so every transition is matched exhaustively
//! and an invalid step simply cannot be represented. Plaintext secrets carried
//! by a pending wallet creation live in `Zeroizing` buffers and are wiped
//! whenever the operation is cleared or replaced.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStep {
    AwaitingPin,
    AwaitingPinConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStep {
    AwaitingRecipient,
    AwaitingAmount,
    AwaitingPinForConfirmation,
}

/// One in-flight multi-step flow for one owner.
pub enum PendingOperation {
    WalletCreation {
        step: CreationStep,
        public_key: String,
        secret_seed: Zeroizing<String>,
        pin: Option<Zeroizing<String>>,
    },
    Payment {
        step: PaymentStep,
        recipient: Option<String>,
        amount: Option<Decimal>,
    },
}

impl PendingOperation {
    pub fn new_wallet_creation(public_key: String, secret_seed: Zeroizing<String>) -> Self {
        PendingOperation::WalletCreation {
            step: CreationStep::AwaitingPin,
            public_key,
            secret_seed,
            pin: None,
        }
    }

    pub fn new_payment() -> Self {
        PendingOperation::Payment {
            step: PaymentStep::AwaitingRecipient,
            recipient: None,
            amount: None,
        }
    }
}

/// Holds the single pending-operation slot per owner.
///
/// `take` removes the operation so the engine can consume or re-insert it;
/// dropping a taken operation (or calling `clear`) zeroizes its secrets.
#[derive(Default)]
pub struct DialogStore {
    slots: Mutex<HashMap<String, PendingOperation>>,
}

impl DialogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new pending operation, implicitly discarding any previous
    /// one for this owner (its secrets are dropped immediately).
    pub async fn begin(&self, owner_id: &str, op: PendingOperation) {
        self.slots.lock().await.insert(owner_id.to_string(), op);
    }

    /// Remove and return the pending operation, if any.
    pub async fn take(&self, owner_id: &str) -> Option<PendingOperation> {
        self.slots.lock().await.remove(owner_id)
    }

    /// Re-install an operation taken with [`take`].
    pub async fn restore(&self, owner_id: &str, op: PendingOperation) {
        self.slots.lock().await.insert(owner_id.to_string(), op);
    }

    pub async fn has_pending(&self, owner_id: &str) -> bool {
        self.slots.lock().await.contains_key(owner_id)
    }

    /// Purge the slot. Called on every terminal path.
    pub async fn clear(&self, owner_id: &str) {
        self.slots.lock().await.remove(owner_id);
    }
}

/// Per-owner mutual exclusion: two messages from the same owner are handled
/// strictly one after the other, while distinct owners proceed concurrently.
#[derive(Default)]
pub struct OwnerLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Owner ids come straight off the wire, so the map would grow
            // without bound. An entry whose Arc is only held by the map has
            // no holder and no waiter and can go; acquirers clone under this
            // same map lock, so the count can't race upward underneath us.
            map.retain(|id, lock| id == owner_id || Arc::strong_count(lock) > 1);
            map.entry(owner_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_slot_per_owner() {
        let store = DialogStore::new();
        store.begin("alice", PendingOperation::new_payment()).await;
        store
            .begin(
                "alice",
                PendingOperation::new_wallet_creation("G".into(), Zeroizing::new("S".into())),
            )
            .await;

        match store.take("alice").await {
            Some(PendingOperation::WalletCreation { step, .. }) => {
                assert_eq!(step, CreationStep::AwaitingPin)
            }
            _ => panic!("expected the replacement operation"),
        }
        assert!(!store.has_pending("alice").await);
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let store = DialogStore::new();
        store.begin("alice", PendingOperation::new_payment()).await;
        store.begin("bob", PendingOperation::new_payment()).await;

        store.clear("alice").await;
        assert!(!store.has_pending("alice").await);
        assert!(store.has_pending("bob").await);
    }

    #[tokio::test]
    async fn test_take_and_restore() {
        let store = DialogStore::new();
        store.begin("alice", PendingOperation::new_payment()).await;

        let mut op = store.take("alice").await.unwrap();
        if let PendingOperation::Payment { step, recipient, .. } = &mut op {
            *recipient = Some("915551234@chat.local".to_string());
            *step = PaymentStep::AwaitingAmount;
        }
        store.restore("alice", op).await;

        match store.take("alice").await {
            Some(PendingOperation::Payment { step, recipient, .. }) => {
                assert_eq!(step, PaymentStep::AwaitingAmount);
                assert_eq!(recipient.as_deref(), Some("915551234@chat.local"));
            }
            _ => panic!("expected payment operation"),
        }
    }

    #[tokio::test]
    async fn test_owner_locks_serialize_same_owner() {
        let locks = Arc::new(OwnerLocks::new());
        let counter = Arc::new(Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("alice").await;
                let mut c = counter.lock().await;
                *c += 1;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*counter.lock().await, 8);
    }

    #[tokio::test]
    async fn test_owner_locks_distinct_owners_dont_block() {
        let locks = OwnerLocks::new();
        let _alice = locks.acquire("alice").await;
        // Bob's lock must be acquirable while Alice's guard is held.
        let _bob = locks.acquire("bob").await;
    }

    #[tokio::test]
    async fn test_owner_locks_evict_idle_entries() {
        let locks = OwnerLocks::new();
        {
            let _guard = locks.acquire("alice").await;
        }
        let _bob = locks.acquire("bob").await;

        let map = locks.inner.lock().await;
        assert!(!map.contains_key("alice"));
        assert!(map.contains_key("bob"));
    }

    #[tokio::test]
    async fn test_owner_locks_keep_held_entries() {
        let locks = OwnerLocks::new();
        let _alice = locks.acquire("alice").await;
        let _bob = locks.acquire("bob").await;

        let map = locks.inner.lock().await;
        assert!(map.contains_key("alice"));
        assert!(map.contains_key("bob"));
    }
}
