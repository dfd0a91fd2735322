//! Per-owner claims.
//!
//! A claim is the only primitive shared across notification handlers. It
//! serializes lifecycle work for one (community, owner) pair without any
//! lock spanning owners:
//!
//! - provisioning uses [`ClaimTable::try_claim`] and treats a held claim as a
//!   duplicate trigger;
//! - deprovisioning uses [`ClaimTable::claim`] and waits for an in-flight
//!   provisioning of the same owner to finish.
//!
//! Claims are released when the returned [`OwnerClaim`] is dropped, on every
//! exit path. Idle entries are pruned on release.

use common::types::OwnerKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Table of per-owner claims.
#[derive(Debug, Default)]
pub struct ClaimTable {
    slots: Mutex<HashMap<OwnerKey, Slot>>,
}

impl ClaimTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the claim for `key` if nobody holds it.
    pub fn try_claim(self: &Arc<Self>, key: OwnerKey) -> Option<OwnerClaim> {
        let slot = self.slot(key);
        let guard = slot.try_lock_owned().ok()?;
        Some(OwnerClaim {
            key,
            guard: Some(guard),
            table: Arc::clone(self),
        })
    }

    /// Wait for the claim for `key`.
    pub async fn claim(self: &Arc<Self>, key: OwnerKey) -> OwnerClaim {
        let slot = self.slot(key);
        let guard = slot.lock_owned().await;
        OwnerClaim {
            key,
            guard: Some(guard),
            table: Arc::clone(self),
        }
    }

    /// Whether someone currently holds the claim for `key`.
    #[must_use]
    pub fn is_claimed(&self, key: OwnerKey) -> bool {
        self.slots()
            .get(&key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Number of keys with a holder or waiter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slot(&self, key: OwnerKey) -> Slot {
        Arc::clone(self.slots().entry(key).or_default())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<OwnerKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: OwnerKey) {
        let mut slots = self.slots();
        // Only the table's own reference left: no holder, no waiter.
        if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&key);
        }
    }
}

/// A held claim. Dropping it releases the claim.
#[derive(Debug)]
pub struct OwnerClaim {
    key: OwnerKey,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<ClaimTable>,
}

impl OwnerClaim {
    #[must_use]
    pub fn key(&self) -> OwnerKey {
        self.key
    }
}

impl Drop for OwnerClaim {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table.release(self.key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::{CommunityId, MemberId};
    use std::time::Duration;

    fn key(owner: u64) -> OwnerKey {
        OwnerKey::new(CommunityId(1), MemberId(owner))
    }

    #[test]
    fn test_try_claim_rejects_second_holder() {
        let table = Arc::new(ClaimTable::new());

        let first = table.try_claim(key(1)).expect("first claim");
        assert!(table.try_claim(key(1)).is_none());
        assert!(table.is_claimed(key(1)));

        drop(first);
        assert!(!table.is_claimed(key(1)));
        assert!(table.try_claim(key(1)).is_some());
    }

    #[test]
    fn test_owners_are_independent() {
        let table = Arc::new(ClaimTable::new());

        let _a = table.try_claim(key(1)).expect("claim a");
        let _b = table.try_claim(key(2)).expect("claim b");
        let other_community = OwnerKey::new(CommunityId(2), MemberId(1));
        assert!(table.try_claim(other_community).is_some());
    }

    #[test]
    fn test_release_prunes_idle_entries() {
        let table = Arc::new(ClaimTable::new());

        let claim = table.try_claim(key(1)).expect("claim");
        assert_eq!(table.len(), 1);

        drop(claim);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_claim_waits_for_holder() {
        let table = Arc::new(ClaimTable::new());
        let held = table.try_claim(key(1)).expect("claim");

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                let claim = table.claim(key(1)).await;
                claim.key()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let claimed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the claim")
            .unwrap();
        assert_eq!(claimed, key(1));
        assert!(table.is_empty());
    }
}
