//! Per-instance serialization of lifecycle operations

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One async mutex per instance id, created on first use
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `id`; hold its guard for the whole operation
    pub fn lock_for(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(id).or_default())
    }

    pub fn forget(&self, id: i64) {
        self.locks.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_id_shares_lock() {
        let locks = InstanceLocks::new();
        let first = locks.lock_for(1);
        let _guard = first.lock().await;

        assert!(locks.lock_for(1).try_lock().is_err());
        assert!(locks.lock_for(2).try_lock().is_ok());
    }
}
