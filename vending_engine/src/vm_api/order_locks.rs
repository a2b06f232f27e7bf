use std::sync::Arc;

use dashmap::DashMap;
use log::trace;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db_types::OrderId;

/// Once the map holds more entries than this, idle locks are dropped whenever a new lock is taken.
const PRUNE_THRESHOLD: usize = 256;

/// In-process mutual exclusion per order id.
///
/// Payment confirmation, dispense triggering, hardware results and lazy expiry all take the lock for the order they
/// touch, so a webhook and a manual verification for the same order cannot interleave. Different orders never
/// contend. Cloning the map shares the locks.
#[derive(Clone, Default)]
pub struct OrderLocks {
    locks: Arc<DashMap<OrderId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for OrderLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderLocks({} held)", self.locks.len())
    }
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for, and takes, the lock for `order_id`. The lock is released when the guard is dropped.
    pub async fn lock(&self, order_id: &OrderId) -> OwnedMutexGuard<()> {
        // The map guard must be released before awaiting the mutex.
        let mutex = self.locks.entry(order_id.clone()).or_default().value().clone();
        self.prune();
        trace!("🔄️ Waiting for lock on order [{order_id}]");
        mutex.lock_owned().await
    }

    /// The number of orders that currently have a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn prune(&self) {
        if self.locks.len() > PRUNE_THRESHOLD {
            // Only the map holds a reference to an idle lock.
            self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        }
    }
}
