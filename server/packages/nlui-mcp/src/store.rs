use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long a stored UI description stays retrievable.
pub const INSTANCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default period between expiry sweeps. Must stay below [`INSTANCE_TTL`].
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct StoredInstance {
    pub id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// In-memory map of instance id to UI description.
///
/// The map lives behind a synchronous mutex that is never held across an
/// await, so a sweep pass and a `put` can never interleave.
#[derive(Debug)]
pub struct InstanceStore {
    instances: Mutex<HashMap<String, StoredInstance>>,
    ttl: Duration,
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::with_ttl(INSTANCE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn put(&self, payload: Value) -> String {
        self.put_at(payload, Utc::now())
    }

    pub fn put_at(&self, payload: Value, created_at: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        let instance = StoredInstance {
            id: id.clone(),
            payload,
            created_at,
        };
        let count = {
            let mut guard = self.lock();
            guard.insert(id.clone(), instance);
            guard.len()
        };
        tracing::debug!(instance_id = %id, stored = count, "store: instance stored");
        id
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.lock().get(id).map(|instance| instance.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry older than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let (removed, remaining) = {
            let mut guard = self.lock();
            let before = guard.len();
            guard.retain(|_, instance| {
                // Entries stamped in the future are treated as fresh.
                match now.signed_duration_since(instance.created_at).to_std() {
                    Ok(age) => age <= ttl,
                    Err(_) => true,
                }
            });
            (before - guard.len(), guard.len())
        };
        if removed > 0 {
            tracing::info!(removed, remaining, "store: expired instances swept");
        }
        removed
    }

    /// Spawns the periodic expiry sweep. The first tick fires one interval
    /// after spawning.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredInstance>> {
        // Every mutation completes before the guard drops; poisoning is ignored.
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
