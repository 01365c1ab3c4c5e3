use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide payload storage quota, per §5: every payload byte accepted
/// from a convergence layer or local application must be reserved against
/// this budget before it is written, and released once the bundle carrying
/// it is gone. Uses a CAS loop rather than a lock since reservation is a
/// pure counter update on the hot receive path.
#[derive(Debug)]
pub struct PayloadStore {
    limit: u64,
    used: AtomicU64,
}

impl PayloadStore {
    pub fn new(limit: u64) -> Self {
        PayloadStore {
            limit,
            used: AtomicU64::new(0),
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Reserves `n` bytes against the quota, returning `false` (reserving
    /// nothing) if doing so would exceed `limit`.
    pub fn try_reserve_payload_space(&self, n: u64) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(n) {
                Some(v) if v <= self.limit => v,
                _ => return false,
            };
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases `n` previously-reserved bytes back to the quota.
    pub fn release_payload_space(&self, n: u64) {
        self.used.fetch_sub(n, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_up_to_limit() {
        let store = PayloadStore::new(100);
        assert!(store.try_reserve_payload_space(60));
        assert!(store.try_reserve_payload_space(40));
        assert!(!store.try_reserve_payload_space(1));
        assert_eq!(store.used(), 100);
    }

    #[test]
    fn release_frees_capacity() {
        let store = PayloadStore::new(100);
        assert!(store.try_reserve_payload_space(100));
        store.release_payload_space(30);
        assert_eq!(store.used(), 70);
        assert!(store.try_reserve_payload_space(30));
        assert!(!store.try_reserve_payload_space(1));
    }
}
