//! Optional persistent mirror for the room registry
//!
//! The in-memory map is always primary. When Redis is configured, every
//! mutation is written through as JSON under `room:{fingerprint}` with a
//! TTL equal to the room's remaining lifetime, so rooms survive a relay
//! restart inside their hour and Redis reaps whatever the sweeper misses.

use tracing::warn;

use crate::room::Room;

/// Persistence backing, dispatched by variant
pub enum Store {
    /// No persistence; rooms die with the process
    None,
    /// Redis write-through mirror
    #[cfg(feature = "redis")]
    Redis(RedisStore),
}

impl Store {
    /// Connect to the configured backing, falling back to `None` when the
    /// URL is absent or the connection fails
    pub async fn connect(redis_url: Option<&str>) -> Self {
        match redis_url {
            None => Self::None,
            #[cfg(feature = "redis")]
            Some(url) => match RedisStore::connect(url).await {
                Ok(store) => {
                    tracing::info!(url, "connected to Redis mirror");
                    Self::Redis(store)
                }
                Err(e) => {
                    warn!("Redis unavailable, rooms are memory-only: {e}");
                    Self::None
                }
            },
            #[cfg(not(feature = "redis"))]
            Some(url) => {
                warn!(url, "built without the 'redis' feature, ignoring REDIS_URL");
                Self::None
            }
        }
    }

    /// Human-readable backing description for startup logging
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "in-memory",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "redis",
        }
    }

    /// Load a room by fingerprint. Malformed persisted records are
    /// logged, deleted, and treated as absent.
    #[cfg_attr(not(feature = "redis"), allow(unused_variables))]
    pub async fn load(&self, room_hash: &str) -> Option<Room> {
        match self {
            Self::None => None,
            #[cfg(feature = "redis")]
            Self::Redis(store) => match store.load(room_hash).await {
                Ok(room) => room,
                Err(e) => {
                    warn!(room_hash, "evicting malformed persisted room: {e}");
                    let _ = store.remove(room_hash).await;
                    None
                }
            },
        }
    }

    /// Write a room snapshot through to the mirror
    #[cfg_attr(not(feature = "redis"), allow(unused_variables))]
    pub async fn save(&self, room: &Room, now: f64) {
        match self {
            Self::None => {}
            #[cfg(feature = "redis")]
            Self::Redis(store) => {
                if let Err(e) = store.save(room, now).await {
                    warn!(room_hash = %room.room_hash, "failed to persist room: {e}");
                }
            }
        }
    }

    /// Delete a room from the mirror
    #[cfg_attr(not(feature = "redis"), allow(unused_variables))]
    pub async fn remove(&self, room_hash: &str) {
        match self {
            Self::None => {}
            #[cfg(feature = "redis")]
            Self::Redis(store) => {
                if let Err(e) = store.remove(room_hash).await {
                    warn!(room_hash, "failed to delete persisted room: {e}");
                }
            }
        }
    }
}

/// Redis-backed room mirror
#[cfg(feature = "redis")]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisStore {
    /// Open a managed connection to `url`
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(room_hash: &str) -> String {
        format!("room:{room_hash}")
    }

    async fn load(&self, room_hash: &str) -> anyhow::Result<Option<Room>> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(room_hash)).await?;
        match raw {
            None => Ok(None),
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        }
    }

    async fn save(&self, room: &Room, now: f64) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let ttl = (room.expires_at - now).ceil();
        if ttl <= 0.0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(room)?;
        conn.set_ex::<_, _, ()>(Self::key(&room.room_hash), json, ttl as u64)
            .await?;
        Ok(())
    }

    async fn remove(&self, room_hash: &str) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(room_hash)).await?;
        Ok(())
    }
}
