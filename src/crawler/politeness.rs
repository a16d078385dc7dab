//! Per-host request spacing
//!
//! Each host gets its own async lock around its [`HostState`]. A worker
//! holds that lock while it sleeps out the remaining delay, so two workers
//! aiming at one host are serialized while workers on other hosts proceed.
//!
//! Once the table reaches [`PRUNE_AT`] hosts, hosts nobody is waiting on and
//! whose delay has already run out are evicted before a new host is added.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// Host count at which idle hosts are evicted
pub const PRUNE_AT: usize = 1024;

type HostSlot = Arc<AsyncMutex<HostState>>;

/// Shared politeness throttle
#[derive(Debug)]
pub struct PolitenessThrottle {
    hosts: Mutex<HashMap<String, HostSlot>>,
    prune_at: usize,
}

impl Default for PolitenessThrottle {
    fn default() -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            prune_at: PRUNE_AT,
        }
    }
}

impl PolitenessThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until at least `min_delay` has passed since the last request to
    /// `host`, then records the current time as that host's last request
    ///
    /// A zero delay returns immediately without recording anything.
    pub async fn wait(&self, host: &str, min_delay: Duration) {
        if min_delay.is_zero() {
            return;
        }

        let state = self.host_state(host, min_delay);
        let mut state = state.lock().await;

        if let Some(remaining) = state.time_until_next_request(min_delay, Instant::now()) {
            tracing::trace!("Throttling {} for {:?}", host, remaining);
            tokio::time::sleep(remaining).await;
        }

        state.record_request(Instant::now());
    }

    /// Number of requests recorded for `host` since it was last evicted
    pub async fn request_count(&self, host: &str) -> u64 {
        let state = self.hosts().get(host).cloned();
        match state {
            Some(state) => state.lock().await.request_count,
            None => 0,
        }
    }

    /// Number of hosts currently tracked
    pub fn tracked_hosts(&self) -> usize {
        self.hosts().len()
    }

    fn hosts(&self) -> std::sync::MutexGuard<'_, HashMap<String, HostSlot>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn host_state(&self, host: &str, min_delay: Duration) -> HostSlot {
        let mut hosts = self.hosts();

        if hosts.len() >= self.prune_at && !hosts.contains_key(host) {
            let now = Instant::now();
            let before = hosts.len();
            // a held lock or an outside reference means someone is waiting
            hosts.retain(|_, state| {
                Arc::strong_count(state) > 1
                    || state.try_lock().map_or(true, |state| {
                        state.time_until_next_request(min_delay, now).is_some()
                    })
            });
            if hosts.len() < before {
                tracing::debug!(
                    "Evicted {} idle hosts from the politeness table",
                    before - hosts.len()
                );
            }
        }

        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(HostState::new()))),
        )
    }
}
