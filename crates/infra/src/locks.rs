//! Per-owner exclusive locks.
//!
//! Cart mutations and the checkout snapshot-and-clear for one owner run one
//! at a time. Locks are plain `std` mutexes and are never held across an
//! `.await` or an outbound call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use storefront_cart::CartOwner;

#[derive(Debug, Default)]
pub struct OwnerLocks {
    registry: Mutex<HashMap<CartOwner, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<CartOwner, Arc<Mutex<()>>>> {
        // The map is only ever inserted into or pruned; a panic mid-update
        // cannot leave it half-written.
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn handle(&self, owner: CartOwner) -> Arc<Mutex<()>> {
        Arc::clone(self.registry().entry(owner).or_default())
    }

    /// Run `f` while holding the locks of every owner in `owners`.
    ///
    /// Locks are taken in owner order, so two callers locking the same pair
    /// (a merge and a checkout) cannot deadlock.
    pub fn with_locked<R>(&self, owners: &[CartOwner], f: impl FnOnce() -> R) -> R {
        let mut ordered = owners.to_vec();
        ordered.sort();
        ordered.dedup();

        let handles: Vec<(CartOwner, Arc<Mutex<()>>)> =
            ordered.iter().map(|o| (*o, self.handle(*o))).collect();

        let result = {
            let _guards: Vec<MutexGuard<'_, ()>> = handles
                .iter()
                .map(|(_, m)| m.lock().unwrap_or_else(|p| p.into_inner()))
                .collect();
            f()
        };

        self.prune(&handles);
        result
    }

    /// Drop registry entries nobody else is holding or waiting on.
    fn prune(&self, handles: &[(CartOwner, Arc<Mutex<()>>)]) {
        let mut registry = self.registry();
        for (owner, handle) in handles {
            // Registry + this caller.
            if Arc::strong_count(handle) == 2 {
                registry.remove(owner);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registry().len()
    }
}
