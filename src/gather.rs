//! The consuming side of discovery: throttled metric fan-out and the
//! shared attribute cache.
//!
//! A plugin's gather cycle follows one calling convention: create a fresh
//! [`RateLimiter`] for the cycle, drain any pending snapshot from the
//! [`DiscoveryTool`] mailbox into an [`InventoryCache`], then fan the
//! metric queries out across tasks, blocking for one limiter token per
//! spawn. Blocking before the spawn is what turns the rate bound into an
//! in-flight bound.
//!
//! [`DiscoveryTool`]: crate::discovery::DiscoveryTool

use std::future::Future;
use std::sync::RwLock;

use serde_json::Value;
use tracing::warn;

use crate::discovery::{Inventory, InventorySnapshot};
use crate::limiter::RateLimiter;

/// Run one query per item on its own task, acquiring a limiter token
/// before each spawn. Results come back in item order; a worker that
/// panics is logged and dropped from the results.
///
/// A stopped limiter no longer throttles, so the fan-out degrades to
/// plain concurrency instead of deadlocking.
pub async fn throttled_fan_out<T, R, F, Fut>(
    limiter: &mut RateLimiter,
    items: Vec<T>,
    run: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let _ = limiter.acquire().await;
        handles.push(tokio::spawn(run(item)));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "gather worker task aborted"),
        }
    }
    results
}

/// Discovered-object attributes shared between the snapshot-draining side
/// of a gather cycle and its metric-fetch workers.
///
/// One writer (the drain path, via [`replace`]), many concurrent readers
/// (the fan-out), one lock guarding both. Readers get owned copies so no
/// guard outlives a call.
///
/// [`replace`]: InventoryCache::replace
pub struct InventoryCache {
    objects: RwLock<Inventory>,
}

impl InventoryCache {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(Inventory::new()),
        }
    }

    /// Swap in the objects of a freshly drained snapshot.
    pub fn replace(&self, snapshot: &InventorySnapshot) {
        let mut objects = self.objects.write().unwrap();
        *objects = snapshot.objects.clone();
    }

    /// Attributes of one discovered object.
    pub fn get(&self, object_id: &str) -> Option<Value> {
        self.objects.read().unwrap().get(object_id).cloned()
    }

    /// Ids of every discovered object, in no particular order.
    pub fn object_ids(&self) -> Vec<String> {
        self.objects.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InventoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn snapshot(ids: &[&str]) -> InventorySnapshot {
        let objects = ids
            .iter()
            .map(|id| (id.to_string(), json!({"InstanceId": id})))
            .collect();
        InventorySnapshot {
            generated_at: Utc::now(),
            objects,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_returns_every_result_in_order() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(10));
        let results = throttled_fan_out(&mut limiter, vec![1u64, 2, 3, 4, 5], |n| async move {
            n * 10
        })
        .await;
        limiter.stop().await;

        assert_eq!(results, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_spawns_at_most_quota_per_interval() {
        let spawn_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let mut limiter = RateLimiter::new(2, Duration::from_millis(10));

        let times = Arc::clone(&spawn_times);
        throttled_fan_out(&mut limiter, vec![(); 6], move |_| {
            let times = Arc::clone(&times);
            async move {
                times.lock().unwrap().push(Instant::now());
            }
        })
        .await;
        limiter.stop().await;

        let times = spawn_times.lock().unwrap();
        assert_eq!(times.len(), 6);
        for window in times.chunks(2) {
            // Tokens two-at-a-time, one interval apart.
            if let [a, b] = window {
                assert!(*b - *a < Duration::from_millis(10));
            }
        }
        assert!(times[5] - times[0] >= Duration::from_millis(20));
    }

    #[test]
    fn cache_replace_and_read() {
        let cache = InventoryCache::new();
        assert!(cache.is_empty());

        cache.replace(&snapshot(&["i-1", "i-2"]));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("i-1").is_some());
        assert!(cache.get("i-3").is_none());

        let mut ids = cache.object_ids();
        ids.sort();
        assert_eq!(ids, vec!["i-1", "i-2"]);

        // A later snapshot fully replaces the previous one.
        cache.replace(&snapshot(&["i-2"]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("i-1").is_none());
    }

    #[test]
    fn cache_reads_are_owned_copies() {
        let cache = InventoryCache::new();
        cache.replace(&snapshot(&["i-1"]));

        let copy = cache.get("i-1").unwrap();
        cache.replace(&snapshot(&[]));
        // The drained copy outlives the cache contents.
        assert_eq!(copy["InstanceId"], "i-1");
    }
}
