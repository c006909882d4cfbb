use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

/// Per-(owner, service) request pacing. One semaphore per host, acquired for
/// the duration of a single HTTP request — never per logical page, so a
/// paginated list pull doesn't starve its own siblings.
#[derive(Clone)]
pub struct PacingPool {
    permits: usize,
    hosts: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl PacingPool {
    pub fn new(permits: usize) -> Self {
        Self {
            permits,
            hosts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn acquire(&self, owner_id: &str, service: &str) -> tokio::sync::OwnedSemaphorePermit {
        let key = format!("{owner_id}:{service}");
        let sem = {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
                .clone()
        };
        sem.acquire_owned().await.expect("semaphore never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinct_hosts_get_distinct_semaphores() {
        let pool = PacingPool::new(1);
        let _a = pool.acquire("owner1", "ms").await;
        // A different host isn't blocked by owner1's ms permit.
        let fut = pool.acquire("owner1", "tdl");
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), fut).await;
        assert!(result.is_ok());
    }
}
