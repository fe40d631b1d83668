//! Process-wide registry of live subscriptions.
//!
//! The registry owns the teardown handle for each subscription; partition
//! and writer tasks hold clones of the cancellation token only, so there is
//! no ownership cycle between a connection and its subscription.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Teardown handle for one WebSocket subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<Uuid, SubscriptionHandle>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SubscriptionHandle) {
        let mut map = self.inner.write().expect("subscription registry poisoned");
        map.insert(handle.id, handle);
    }

    pub fn remove(&self, id: Uuid) -> Option<SubscriptionHandle> {
        let mut map = self.inner.write().expect("subscription registry poisoned");
        map.remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("subscription registry poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every live subscription; used on shutdown.
    pub fn cancel_all(&self) {
        let map = self.inner.read().expect("subscription registry poisoned");
        for handle in map.values() {
            handle.token.cancel();
        }
    }
}
