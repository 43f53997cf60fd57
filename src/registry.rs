//! Schema Registry
//!
//! Caller-side source of schema payloads. The registry scans its descriptor
//! resources once, indexes every message type they declare, and encodes a
//! type's payload the first time a predicate asks for it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use moka::sync::Cache;
use once_cell::sync::OnceCell;
use prost::Message;
use prost_types::FileDescriptorSet;
use tracing::{debug, info, warn};

use crate::cache::{bounded_cache, SchemaKey};
use crate::checksum::{BundleDigest, ContentHash};
use crate::codec::order::dependency_order;
use crate::codec::SchemaCodec;
use crate::config::FilterConfig;
use crate::discovery::{DirectoryDiscovery, Resource, ResourceDiscovery};
use crate::error::{FilterError, Result};
use crate::predicate::PredicateBuilder;
use crate::schema::{Schema, SchemaPool};

/// A type's payload together with its content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSchema {
    pub payload: Bytes,
    pub hash: ContentHash,
}

/// Every message type found by discovery
struct Catalog {
    pools: Vec<Arc<SchemaPool>>,
    types: HashMap<String, usize>,
    digest: BundleDigest,
}

impl Catalog {
    fn build(resources: &[Resource]) -> Self {
        let mut pools = Vec::with_capacity(resources.len());
        let mut types = HashMap::new();

        for resource in resources {
            match build_pool(resource) {
                Ok(pool) => {
                    let index = pools.len();
                    for name in pool.message_names() {
                        types.entry(name.to_string()).or_insert(index);
                    }
                    pools.push(Arc::new(pool));
                }
                Err(e) => warn!(resource = %resource.name, error = %e, "Skipping descriptor resource"),
            }
        }

        let digest = BundleDigest::of(resources.iter().map(|r| r.bytes.as_slice()));
        info!(
            resources = resources.len(),
            loaded = pools.len(),
            types = types.len(),
            digest = %digest,
            "Built schema catalog"
        );
        Self { pools, types, digest }
    }
}

fn build_pool(resource: &Resource) -> Result<SchemaPool> {
    let set = FileDescriptorSet::decode(resource.bytes.as_slice())?;
    let units: Vec<_> = set.file.iter().collect();
    let mut pool = SchemaPool::new();
    for unit in dependency_order(&units)? {
        pool.add_file(unit.clone())?;
    }
    Ok(pool)
}

/// Maps message types to schemas and encoded payloads
pub struct SchemaRegistry {
    discovery: Box<dyn ResourceDiscovery>,
    codec: SchemaCodec,
    catalog: OnceCell<Catalog>,
    schemas: Cache<String, Schema>,
    payloads: Cache<String, EncodedSchema>,
}

impl SchemaRegistry {
    pub fn new(discovery: impl ResourceDiscovery + 'static, config: &FilterConfig) -> Self {
        Self {
            discovery: Box::new(discovery),
            codec: SchemaCodec::new(config.codec.compression_level),
            catalog: OnceCell::new(),
            schemas: bounded_cache(config.cache.schema_capacity, config.cache.time_to_idle()),
            payloads: bounded_cache(config.cache.payload_capacity, config.cache.time_to_idle()),
        }
    }

    /// Registry over the directories named in `config`
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let discovery = DirectoryDiscovery::from_config(&config.discovery)?;
        Ok(Self::new(discovery, config))
    }

    fn catalog(&self) -> Result<&Catalog> {
        self.catalog.get_or_try_init(|| {
            let resources = self.discovery.discover()?;
            Ok(Catalog::build(&resources))
        })
    }

    /// Fully-qualified names of every known message type, sorted
    pub fn type_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.catalog()?.types.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Digest over every discovered resource
    pub fn digest(&self) -> Result<BundleDigest> {
        Ok(self.catalog()?.digest.clone())
    }

    pub fn schema_for_name(&self, name: &str) -> Result<Schema> {
        let name = name.trim_start_matches('.');
        let schema = self.schemas.try_get_with(name.to_string(), || {
            let catalog = self.catalog()?;
            let pool = catalog
                .types
                .get(name)
                .map(|&index| Arc::clone(&catalog.pools[index]))
                .ok_or_else(|| FilterError::SchemaNotFound { name: name.to_string() })?;
            Schema::from_pool(pool, name).ok_or_else(|| FilterError::SchemaNotFound { name: name.to_string() })
        })?;
        Ok(schema)
    }

    pub fn schema_for<T: prost::Name>(&self) -> Result<Schema> {
        self.schema_for_name(&T::full_name())
    }

    /// Payload and content hash for a type, encoded on first use
    pub fn encoded_for_name(&self, name: &str) -> Result<EncodedSchema> {
        let name = name.trim_start_matches('.');
        let encoded = self.payloads.try_get_with(name.to_string(), || {
            let schema = self.schema_for_name(name)?;
            let payload = self.codec.encode(&schema)?;
            let hash = ContentHash::of(&payload);
            debug!(schema = name, hash = %hash, bytes = payload.len(), "Cached schema payload");
            Ok::<_, FilterError>(EncodedSchema {
                payload: Bytes::from(payload),
                hash,
            })
        })?;
        Ok(encoded)
    }

    pub fn payload_for_name(&self, name: &str) -> Result<Bytes> {
        Ok(self.encoded_for_name(name)?.payload)
    }

    pub fn payload_for<T: prost::Name>(&self) -> Result<Bytes> {
        self.payload_for_name(&T::full_name())
    }

    pub fn content_hash_for_name(&self, name: &str) -> Result<ContentHash> {
        Ok(self.encoded_for_name(name)?.hash)
    }

    pub fn content_hash<T: prost::Name>(&self) -> Result<ContentHash> {
        self.content_hash_for_name(&T::full_name())
    }

    /// Start a predicate on a column holding `T` messages
    pub fn for_column<T: prost::Name>(
        &self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
    ) -> Result<PredicateBuilder> {
        self.for_column_named(&T::full_name(), family, qualifier)
    }

    /// Start a predicate on a column holding messages of the named type
    pub fn for_column_named(
        &self,
        name: &str,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
    ) -> Result<PredicateBuilder> {
        let name = name.trim_start_matches('.');
        let encoded = self.encoded_for_name(name)?;
        Ok(PredicateBuilder::new(
            family,
            qualifier,
            SchemaKey::new(name, encoded.hash),
            Some(encoded.payload),
        ))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("codec", &self.codec)
            .field("catalog_loaded", &self.catalog.get().is_some())
            .finish()
    }
}
