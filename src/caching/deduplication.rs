//! # Miss Deduplication
//!
//! Single-flight coordination for cache misses. The first request that misses on
//! a key becomes the leader and dispatches upstream; concurrent requests for the
//! same key follow and receive the leader's entry through a watch channel.
//!
//! The leader's slot is released by [`LeaderGuard`]'s `Drop`, which runs on
//! success, on error and when the leader's future is cancelled. Followers whose
//! leader vanished without publishing get `None` and dispatch on their own.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::CacheEntry;

type Slot = (u64, watch::Receiver<Option<CacheEntry>>);

/// Tracks in-flight misses by cache key
#[derive(Debug, Clone)]
pub struct MissCoalescer {
    in_flight: Arc<DashMap<String, Slot>>,
    next_id: Arc<AtomicU64>,
    enabled: bool,
}

/// Role assigned to a request that missed the cache
pub enum Flight {
    /// Dispatch upstream, then publish through the guard
    Leader(LeaderGuard),
    /// Wait for the leader's entry
    Follower(watch::Receiver<Option<CacheEntry>>),
}

impl MissCoalescer {
    pub fn new(enabled: bool) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of keys with a dispatch currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Register a miss on `key`.
    ///
    /// When coalescing is disabled every caller is an unregistered leader.
    pub fn join(&self, key: &str) -> Flight {
        let (sender, receiver) = watch::channel(None);

        if !self.enabled {
            return Flight::Leader(LeaderGuard {
                key: key.to_string(),
                id: 0,
                sender,
                slots: None,
            });
        }

        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                debug!("Joining in-flight upstream dispatch");
                Flight::Follower(slot.get().1.clone())
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert((id, receiver));
                Flight::Leader(LeaderGuard {
                    key: key.to_string(),
                    id,
                    sender,
                    slots: Some(self.in_flight.clone()),
                })
            }
        }
    }

    /// Wait for the leader's entry; `None` if it finished without publishing
    pub async fn wait(mut receiver: watch::Receiver<Option<CacheEntry>>) -> Option<CacheEntry> {
        match receiver.wait_for(|entry| entry.is_some()).await {
            Ok(entry) => (*entry).clone(),
            Err(_) => None,
        }
    }
}

impl Default for MissCoalescer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Held by the leader for the duration of its dispatch
pub struct LeaderGuard {
    key: String,
    id: u64,
    sender: watch::Sender<Option<CacheEntry>>,
    slots: Option<Arc<DashMap<String, Slot>>>,
}

impl LeaderGuard {
    /// Hand the stored entry to every follower
    pub fn publish(self, entry: CacheEntry) {
        self.sender.send_replace(Some(entry));
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if let Some(slots) = &self.slots {
            // Only remove the slot this guard registered
            slots.remove_if(&self.key, |_, (id, _)| *id == self.id);
        }
    }
}
