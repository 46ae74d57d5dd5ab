use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per sensor. Holding a sensor's guard serializes its ingestion calls
/// without blocking other sensors.
#[derive(Default)]
pub struct SensorLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SensorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a sensor
    pub async fn acquire(&self, sensor_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(sensor_id).or_default())
        };

        lock.lock_owned().await
    }

    /// Drop the entry for a sensor nobody holds or waits on
    pub async fn forget(&self, sensor_id: i64) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&sensor_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&sensor_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_sensor_waits_for_holder() {
        let locks = Arc::new(SensorLocks::new());
        let guard = locks.acquire(1).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the lock")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_sensors_do_not_contend() {
        let locks = SensorLocks::new();
        let _one = locks.acquire(1).await;

        let two = tokio::time::timeout(Duration::from_millis(200), locks.acquire(2)).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn test_forget_keeps_entries_in_use() {
        let locks = SensorLocks::new();

        let guard = locks.acquire(5).await;
        locks.forget(5).await;
        assert_eq!(locks.len().await, 1);

        drop(guard);
        locks.forget(5).await;
        assert_eq!(locks.len().await, 0);
    }
}
