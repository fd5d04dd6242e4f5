//! The room registry
//!
//! Owns the room map, the rate limiter, the persistent mirror, and the
//! expiry sweeper. Handlers receive it behind an `Arc`; no process-wide
//! singletons. DashMap entry locks serialize read-modify-write per room;
//! snapshots are cloned out before any store I/O so no lock is held
//! across an await.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use sos_proto::RoomMode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{unix_now, SWEEP_INTERVAL_SECS};
use crate::rate_limit::{Decision, RateLimiter};
use crate::room::Room;
use crate::store::Store;

/// Registry-level failures surfaced to handlers
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A non-expired room already holds this fingerprint
    #[error("room already exists")]
    RoomExists,
}

/// Shared server state: rooms, rate limiter, persistence, sweeper
pub struct Registry {
    rooms: DashMap<String, Room>,
    limiter: Mutex<RateLimiter>,
    store: Store,
}

impl Registry {
    /// Registry with the given persistence backing
    pub fn new(store: Store) -> Self {
        Self {
            rooms: DashMap::new(),
            limiter: Mutex::new(RateLimiter::new()),
            store,
        }
    }

    /// Number of rooms currently in memory
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rate-limit check for a limited operation from `ip`
    pub fn check_rate(&self, ip: &str, now: f64) -> Decision {
        self.limiter
            .lock()
            .map(|mut limiter| limiter.check(ip, now))
            .unwrap_or(Decision::Allowed)
    }

    /// Wipe the rate-limit entry for `ip` (successful join)
    pub fn reset_rate(&self, ip: &str) {
        if let Ok(mut limiter) = self.limiter.lock() {
            limiter.reset(ip);
        }
    }

    /// Fetch a room snapshot, evicting lazily if it has expired.
    ///
    /// Misses fall through to the persistent mirror; a live persisted
    /// room is pulled back into memory (relay restart inside the TTL).
    pub async fn lookup(&self, room_hash: &str, now: f64) -> Option<Room> {
        if let Some(room) = self.rooms.get(room_hash).map(|r| r.value().clone()) {
            if !room.is_expired(now) {
                return Some(room);
            }
            self.rooms.remove(room_hash);
            self.store.remove(room_hash).await;
            debug!(room_hash, "lazily evicted expired room");
            return None;
        }

        match self.store.load(room_hash).await {
            Some(room) if !room.is_expired(now) => {
                self.rooms.insert(room_hash.to_string(), room.clone());
                Some(room)
            }
            Some(_) => {
                self.store.remove(room_hash).await;
                None
            }
            None => None,
        }
    }

    /// Create a room, seating the caller as `"creator"`.
    ///
    /// Returns the room snapshot and the creator's member token, or
    /// [`RegistryError::RoomExists`] if a live room holds the fingerprint.
    pub async fn create(
        &self,
        room_hash: &str,
        mode: RoomMode,
        now: f64,
    ) -> Result<(Room, String), RegistryError> {
        if self.lookup(room_hash, now).await.is_some() {
            return Err(RegistryError::RoomExists);
        }

        let (room, member_id) = Room::create(room_hash.to_string(), mode, now);

        use dashmap::mapref::entry::Entry;
        match self.rooms.entry(room_hash.to_string()) {
            Entry::Occupied(_) => return Err(RegistryError::RoomExists),
            Entry::Vacant(slot) => {
                slot.insert(room.clone());
            }
        }

        self.store.save(&room, now).await;
        info!(room_hash, %mode, "room created");
        Ok((room, member_id))
    }

    /// Apply a mutation to a live room and persist the result.
    ///
    /// The closure runs under the room's entry lock; the updated snapshot
    /// is cloned out and written to the mirror afterwards. Returns `None`
    /// when the room is absent or expired.
    pub async fn mutate<T>(
        &self,
        room_hash: &str,
        now: f64,
        f: impl FnOnce(&mut Room) -> T,
    ) -> Option<T> {
        self.lookup(room_hash, now).await?;

        let (out, snapshot) = {
            let mut room = self.rooms.get_mut(room_hash)?;
            let out = f(room.value_mut());
            (out, room.value().clone())
        };

        self.store.save(&snapshot, now).await;
        Some(out)
    }

    /// Evict every room past its deadline. Store deletes happen after the
    /// map scan so no I/O runs under a map lock. Returns the eviction
    /// count.
    pub async fn sweep(&self, now: f64) -> usize {
        let mut evicted = Vec::new();
        self.rooms.retain(|hash, room| {
            if room.is_expired(now) {
                evicted.push(hash.clone());
                false
            } else {
                true
            }
        });

        for room_hash in &evicted {
            self.store.remove(room_hash).await;
            info!(room_hash, "swept expired room");
        }

        if let Ok(mut limiter) = self.limiter.lock() {
            limiter.prune(now);
        }

        evicted.len()
    }

    /// Spawn the background sweeper. Wakes every
    /// [`SWEEP_INTERVAL_SECS`] until the token is cancelled; any single
    /// iteration's failure is logged and the loop continues.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let interval = Duration::from_secs(SWEEP_INTERVAL_SECS);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let evicted = registry.sweep(unix_now()).await;
                if evicted > 0 {
                    debug!(evicted, "sweeper pass complete");
                }
            }
        });
    }
}
