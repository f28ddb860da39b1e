//! Keyed critical sections for tables and groups.
//!
//! Every operation that reads a bill and then writes it runs while holding
//! the lock of its table or group, so two terminals submitting to the same
//! target are serialized. Different targets never contend.

use std::collections::HashMap;
use std::sync::Arc;

use common::AggregateId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which idle entries are pruned on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// What a lock protects.
///
/// The derived order puts every group before every table, which is the
/// acquisition order used by [`KeyedLocks::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Group(AggregateId),
    Table(AggregateId),
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct KeyedGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedGuard {
    /// Held keys in acquisition order.
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

/// In-process mutex map keyed by table or group id.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    entries: Arc<Mutex<HashMap<LockKey, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks all `keys`: groups first, then tables in ascending id order.
    ///
    /// Acquiring in one global order means two operations touching
    /// overlapping sets of tables can't deadlock.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> KeyedGuard {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut entries = self.entries.lock().await;
            if entries.len() > PRUNE_THRESHOLD {
                entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            }
            let mutexes: Vec<Arc<Mutex<()>>> = keys
                .iter()
                .map(|key| Arc::clone(entries.entry(*key).or_default()))
                .collect();
            metrics::gauge!("bill_locks_tracked").set(entries.len() as f64);
            mutexes
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        KeyedGuard {
            keys,
            _guards: guards,
        }
    }
}
