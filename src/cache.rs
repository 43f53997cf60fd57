//! Evaluation-side schema cache
//!
//! Predicates arrive carrying a [`SchemaKey`] and, unless an earlier
//! predicate already shipped it, the schema payload. The cache rebuilds each
//! distinct schema once and hands out shared handles after that.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::ContentHash;
use crate::codec::SchemaCodec;
use crate::config::CacheConfig;
use crate::error::{FilterError, Result};
use crate::schema::Schema;

/// Identity of a schema payload: the type name plus the payload's hash.
///
/// Hits are trusted without looking at the payload again, so two different
/// payloads for one name that collide on the hash resolve to whichever was
/// cached first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    pub name: String,
    pub hash: ContentHash,
}

impl SchemaKey {
    pub fn new(name: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            name: name.into(),
            hash,
        }
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.hash)
    }
}

/// Bounded concurrent cache with optional time-to-idle eviction
pub(crate) fn bounded_cache<K, V>(capacity: u64, time_to_idle: Option<Duration>) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let builder = Cache::builder().max_capacity(capacity);
    match time_to_idle {
        Some(tti) => builder.time_to_idle(tti).build(),
        None => builder.build(),
    }
}

/// Reconstructed schemas keyed by [`SchemaKey`]
pub struct SchemaCache {
    schemas: Cache<SchemaKey, Schema>,
    codec: SchemaCodec,
}

impl SchemaCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_codec(config, SchemaCodec::default())
    }

    pub fn with_codec(config: &CacheConfig, codec: SchemaCodec) -> Self {
        Self {
            schemas: bounded_cache(config.schema_capacity, config.time_to_idle()),
            codec,
        }
    }

    /// Return the schema cached under `key`, decoding `payload` on a miss.
    ///
    /// Concurrent misses on one key decode once; the other callers wait for
    /// that result. A miss without a non-empty payload is an error.
    pub fn resolve(&self, key: &SchemaKey, payload: Option<&[u8]>) -> Result<Schema> {
        if let Some(schema) = self.schemas.get(key) {
            return Ok(schema);
        }
        let payload = payload.filter(|p| !p.is_empty()).ok_or_else(|| FilterError::MissingPayload {
            name: key.name.clone(),
        })?;

        let schema = self.schemas.try_get_with(key.clone(), || {
            debug!(key = %key, bytes = payload.len(), "Schema cache miss, decoding payload");
            self.codec.decode(payload)
        })?;
        Ok(schema)
    }

    /// Cached schema, if present
    pub fn get(&self, key: &SchemaKey) -> Option<Schema> {
        self.schemas.get(key)
    }

    pub fn invalidate_all(&self) {
        self.schemas.invalidate_all();
    }

    /// Approximate number of cached schemas
    pub fn entry_count(&self) -> u64 {
        self.schemas.run_pending_tasks();
        self.schemas.entry_count()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.schemas.entry_count())
            .field("codec", &self.codec)
            .finish()
    }
}
