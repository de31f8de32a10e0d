//! Redis hot-state mirror.
//!
//! The in-process [`RegionStateStore`](pandemos_core::RegionStateStore) is
//! the source of truth; after each committed tick the engine mirrors the
//! world snapshot here so cold API replicas and reconnecting dashboards
//! can serve state without touching the leader.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `world:tick` | Integer | Last committed tick id |
//! | `world:snapshot` | JSON | Serialized [`WorldSnapshot`] |
//! | `region:{id}:level` | Integer | One region's infection level |

use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;

use pandemos_types::{RegionId, WorldSnapshot};

use crate::error::DbError;

/// Connection handle to a Redis-compatible instance.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Connect to Redis at the given URL.
    ///
    /// The URL follows the Redis URL scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Redis`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config =
            Config::from_url(url).map_err(|e| DbError::Config(format!("Invalid Redis URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Redis");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Redis`] if the write fails.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key does not exist.
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Redis`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Redis`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// Set the last committed tick id (`world:tick`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Redis`] if the write fails.
    pub async fn set_world_tick(&self, tick_id: u64) -> Result<(), DbError> {
        let _: () = self
            .client
            .set("world:tick", tick_id.to_string().as_str(), None, None, false)
            .await?;
        Ok(())
    }

    /// Get the last committed tick id (`world:tick`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if not set.
    /// Returns [`DbError::Redis`] if the read fails.
    pub async fn get_world_tick(&self) -> Result<u64, DbError> {
        let value: Option<String> = self.client.get("world:tick").await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound("world:tick".to_owned())),
            |s| {
                s.parse::<u64>()
                    .map_err(|e| DbError::Config(format!("world:tick is not a valid u64: {e}")))
            },
        )
    }

    /// Mirror a committed world snapshot: the full JSON document plus the
    /// per-region level keys and `world:tick`, in that order, so readers
    /// that see the new tick id also see the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or any write fails.
    pub async fn mirror_snapshot(&self, snapshot: &WorldSnapshot) -> Result<(), DbError> {
        self.set_json("world:snapshot", snapshot).await?;
        for (region_id, level) in &snapshot.regions {
            let key = region_level_key(region_id);
            let _: () = self
                .client
                .set(key.as_str(), level.to_string().as_str(), None, None, false)
                .await?;
        }
        self.set_world_tick(snapshot.tick_id).await?;

        tracing::debug!(
            tick_id = snapshot.tick_id,
            regions = snapshot.regions.len(),
            "Mirrored world snapshot to Redis"
        );
        Ok(())
    }

    /// Read the mirrored world snapshot (`world:snapshot`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if not found, deserialization, or read fails.
    pub async fn get_snapshot(&self) -> Result<WorldSnapshot, DbError> {
        self.get_json("world:snapshot").await
    }

    /// Read one region's mirrored level (`region:{id}:level`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if not set.
    /// Returns [`DbError::Redis`] if the read fails.
    pub async fn get_region_level(&self, region_id: &RegionId) -> Result<u16, DbError> {
        let key = region_level_key(region_id);
        let value: Option<String> = self.client.get(key.as_str()).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.clone())),
            |s| {
                s.parse::<u16>()
                    .map_err(|e| DbError::Config(format!("{key} is not a valid u16: {e}")))
            },
        )
    }

    /// Flush all keys from the Redis instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Redis`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// Key for one region's mirrored infection level.
fn region_level_key(region_id: &RegionId) -> String {
    format!("region:{region_id}:level")
}
