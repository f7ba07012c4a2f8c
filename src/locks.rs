use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// One async lock per identifier, created on demand.
///
/// Callers holding different identifiers never contend; callers holding the
/// same identifier are serialized in arrival order. Entries nobody holds or
/// waits on are dropped the next time the table is touched.
#[derive(Debug, Default)]
pub(crate) struct IdentifierLocks {
    table: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentifierLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, identifier: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(table.entry(identifier.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_identifier_serializes() {
        let locks = Arc::new(IdentifierLocks::new());
        let guard = locks.lock("a").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_identifiers_do_not_block() {
        let locks = IdentifierLocks::new();
        let _a = locks.lock("a").await;
        let _b = locks.lock("b").await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = IdentifierLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        // Touching the table prunes "a" and "b" before inserting "c"
        let _c = locks.lock("c").await;
        assert_eq!(locks.tracked(), 1);
    }
}
