//! L2: the shared key/value tier (spec §4.4).
//!
//! [`L2Backend`] is the swappable interface; [`InMemoryL2`] is always
//! available (used by tests and single-process deployments). The
//! `storage-redis` and `storage-sqlite` features add real shared backends
//! without changing [`crate::cache::TwoTierCache`]'s logic.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Fingerprint, ValidationResult};

/// Errors from an L2 backend. Per spec §4.4 "Failure semantics", callers
/// must treat any of these as a plain cache miss rather than propagate them.
#[derive(Debug, Error)]
pub enum L2Error {
    /// The backend connection or query failed.
    #[error("L2 cache backend error: {0}")]
    Backend(String),
}

/// A shared, externally-managed key/value store keyed by [`Fingerprint`].
#[async_trait]
pub trait L2Backend: Send + Sync {
    /// Fetch `fingerprint`, if present and unexpired.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<(ValidationResult, u64)>, L2Error>;

    /// Store `result` (alongside the `policy_version` it was computed
    /// under) with the backend's configured TTL.
    async fn put(
        &self,
        fingerprint: Fingerprint,
        result: ValidationResult,
        policy_version: u64,
    ) -> Result<(), L2Error>;
}

struct Entry {
    result: ValidationResult,
    policy_version: u64,
    inserted_at: Instant,
}

/// An in-process stand-in for a shared store — used by [`crate::testing`]
/// fixtures and whenever no `storage-*` feature is enabled.
pub struct InMemoryL2 {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    ttl: Duration,
}

impl InMemoryL2 {
    /// Build an in-memory L2 with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl L2Backend for InMemoryL2 {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<(ValidationResult, u64)>, L2Error> {
        let mut entries = self.entries.lock().expect("l2 in-memory lock poisoned");
        let Some(entry) = entries.get(fingerprint) else {
            return Ok(None);
        };
        if entry.inserted_at.elapsed() > self.ttl {
            entries.remove(fingerprint);
            return Ok(None);
        }
        Ok(Some((entry.result.clone(), entry.policy_version)))
    }

    async fn put(
        &self,
        fingerprint: Fingerprint,
        result: ValidationResult,
        policy_version: u64,
    ) -> Result<(), L2Error> {
        self.entries.lock().expect("l2 in-memory lock poisoned").insert(
            fingerprint,
            Entry {
                result,
                policy_version,
                inserted_at: Instant::now(),
            },
        );
        Ok(())
    }
}

#[cfg(feature = "storage-redis")]
pub use redis_backend::RedisL2;

#[cfg(feature = "storage-redis")]
mod redis_backend {
    use async_trait::async_trait;
    use redis::AsyncCommands;

    use super::{Fingerprint, L2Backend, L2Error, ValidationResult};

    /// L2 backend over a Redis-compatible store.
    ///
    /// Values are JSON-encoded `(ValidationResult, policy_version)` pairs;
    /// TTL is enforced by Redis's own key expiry rather than re-checked
    /// client-side.
    pub struct RedisL2 {
        client: redis::Client,
        ttl_seconds: u64,
    }

    impl RedisL2 {
        /// Connect to `url` (e.g. `redis://127.0.0.1/`), using `ttl_seconds`
        /// as the key expiry.
        ///
        /// # Errors
        ///
        /// Returns [`L2Error::Backend`] if the client cannot be constructed.
        pub fn connect(url: &str, ttl_seconds: u64) -> Result<Self, L2Error> {
            let client = redis::Client::open(url).map_err(|e| L2Error::Backend(e.to_string()))?;
            Ok(Self { client, ttl_seconds })
        }
    }

    #[async_trait]
    impl L2Backend for RedisL2 {
        async fn get(
            &self,
            fingerprint: &Fingerprint,
        ) -> Result<Option<(ValidationResult, u64)>, L2Error> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| L2Error::Backend(e.to_string()))?;
            let raw: Option<String> = conn
                .get(fingerprint)
                .await
                .map_err(|e| L2Error::Backend(e.to_string()))?;
            let Some(raw) = raw else {
                return Ok(None);
            };
            let (result, policy_version): (ValidationResult, u64) =
                serde_json::from_str(&raw).map_err(|e| L2Error::Backend(e.to_string()))?;
            Ok(Some((result, policy_version)))
        }

        async fn put(
            &self,
            fingerprint: Fingerprint,
            result: ValidationResult,
            policy_version: u64,
        ) -> Result<(), L2Error> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| L2Error::Backend(e.to_string()))?;
            let encoded = serde_json::to_string(&(result, policy_version))
                .map_err(|e| L2Error::Backend(e.to_string()))?;
            let _: () = conn
                .set_ex(fingerprint, encoded, self.ttl_seconds)
                .await
                .map_err(|e| L2Error::Backend(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(feature = "storage-sqlite")]
pub use sqlite_backend::SqliteL2;

#[cfg(feature = "storage-sqlite")]
mod sqlite_backend {
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    use super::{Fingerprint, L2Backend, L2Error, ValidationResult};

    /// L2 backend over a SQLite database, for single-node deployments that
    /// want a shared tier surviving process restarts without standing up
    /// Redis.
    pub struct SqliteL2 {
        pool: SqlitePool,
        ttl_seconds: i64,
    }

    impl SqliteL2 {
        /// Connect to `pool`, using `ttl_seconds` as the entry expiry.
        /// Assumes a `cache_entries(fingerprint TEXT PRIMARY KEY, payload
        /// TEXT, policy_version INTEGER, inserted_at INTEGER)` table exists.
        #[must_use]
        pub fn new(pool: SqlitePool, ttl_seconds: i64) -> Self {
            Self { pool, ttl_seconds }
        }
    }

    #[async_trait]
    impl L2Backend for SqliteL2 {
        async fn get(
            &self,
            fingerprint: &Fingerprint,
        ) -> Result<Option<(ValidationResult, u64)>, L2Error> {
            let row: Option<(String, i64, i64)> = sqlx::query_as(
                "SELECT payload, policy_version, inserted_at FROM cache_entries WHERE fingerprint = ?",
            )
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| L2Error::Backend(e.to_string()))?;

            let Some((payload, policy_version, inserted_at)) = row else {
                return Ok(None);
            };

            let now = i64::try_from(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            )
            .unwrap_or(i64::MAX);
            if now - inserted_at > self.ttl_seconds {
                return Ok(None);
            }

            let result: ValidationResult =
                serde_json::from_str(&payload).map_err(|e| L2Error::Backend(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            Ok(Some((result, policy_version as u64)))
        }

        async fn put(
            &self,
            fingerprint: Fingerprint,
            result: ValidationResult,
            policy_version: u64,
        ) -> Result<(), L2Error> {
            let payload = serde_json::to_string(&result).map_err(|e| L2Error::Backend(e.to_string()))?;
            let now = i64::try_from(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            )
            .unwrap_or(0);
            #[allow(clippy::cast_possible_wrap)]
            let version = policy_version as i64;

            sqlx::query(
                "INSERT INTO cache_entries (fingerprint, payload, policy_version, inserted_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                   payload = excluded.payload,
                   policy_version = excluded.policy_version,
                   inserted_at = excluded.inserted_at",
            )
            .bind(fingerprint)
            .bind(payload)
            .bind(version)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| L2Error::Backend(e.to_string()))?;
            Ok(())
        }
    }
}
