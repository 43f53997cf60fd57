//! Schema payloads
//!
//! A payload carries everything needed to rebuild one message schema on a
//! process that has never seen it: the target type name and the units of its
//! dependency closure, nested so that each unit is followed by the units it
//! depends on. The whole thing is gzip-compressed.
//!
//! ```text
//! payload = [version:u8 = 1][target:string] unit
//! unit    = [name:string][bytes:len-prefixed][deps:varint] unit*
//! ```
//!
//! A unit that was already written earlier in the same payload is written
//! again with empty bytes and no dependencies, and the decoder reuses the
//! first copy.

pub mod order;
pub mod prune;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use prost::Message;
use prost_types::FileDescriptorProto;
use tracing::debug;

use crate::compress::{self, DEFAULT_LEVEL};
use crate::error::{FilterError, Result};
use crate::schema::{Schema, SchemaPool};
use crate::wire::{WireReader, WireWriter};

/// Current payload format version
pub const FORMAT_VERSION: u8 = 1;

/// Unit nesting limit when decoding
const MAX_UNIT_DEPTH: usize = 256;

/// Encodes schemas into payloads and rebuilds them
#[derive(Debug, Clone, Copy)]
pub struct SchemaCodec {
    level: u32,
}

impl Default for SchemaCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl SchemaCodec {
    /// Create a codec compressing at the given gzip level
    pub fn new(level: u32) -> Self {
        Self { level }
    }

    pub fn encode(&self, schema: &Schema) -> Result<Vec<u8>> {
        let mut writer = WireWriter::new();
        writer.put_u8(FORMAT_VERSION);

        let units = if schema.is_self_contained() {
            let (unit, lifted_name) = prune::standalone_unit(schema);
            writer.put_str(&lifted_name);
            writer.put_str(unit.name());
            writer.put_bytes(&unit.encode_to_vec());
            writer.put_varint(0);
            1
        } else {
            writer.put_str(schema.full_name());
            let pool = schema.pool();
            let closure = order::closure(pool, schema.file().name())?;
            let ordered = order::dependency_order(&closure)?;
            let rank: HashMap<&str, usize> = ordered
                .iter()
                .enumerate()
                .map(|(i, unit)| (unit.name(), i))
                .collect();
            let mut emitted = HashSet::new();
            write_unit(&mut writer, pool, schema.file(), &rank, &mut emitted)?;
            emitted.len()
        };

        let raw = writer.into_inner();
        let payload = compress::compress(&raw, self.level)?;
        debug!(
            schema = schema.full_name(),
            units,
            raw_bytes = raw.len(),
            payload_bytes = payload.len(),
            "Encoded schema payload"
        );
        Ok(payload)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Schema> {
        let raw = compress::decompress(payload)?;
        let mut reader = WireReader::new(&raw);

        let version = reader.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(FilterError::UnsupportedVersion(version));
        }
        let target = reader.read_string()?;

        let mut pool = SchemaPool::new();
        read_unit(&mut reader, &mut pool, 0)?;
        if !reader.is_empty() {
            return Err(FilterError::malformed("trailing bytes after root unit"));
        }

        debug!(schema = %target, "Decoded schema payload");
        Schema::from_pool(Arc::new(pool), &target)
            .ok_or_else(|| FilterError::malformed(format!("payload does not declare {target}")))
    }
}

fn write_unit<'p>(
    writer: &mut WireWriter,
    pool: &'p SchemaPool,
    unit: &'p FileDescriptorProto,
    rank: &HashMap<&str, usize>,
    emitted: &mut HashSet<&'p str>,
) -> Result<()> {
    writer.put_str(unit.name());
    if !emitted.insert(unit.name()) {
        writer.put_bytes(&[]);
        writer.put_varint(0);
        return Ok(());
    }
    writer.put_bytes(&unit.encode_to_vec());

    let mut dependencies = unit
        .dependency
        .iter()
        .map(|name| {
            pool.file(name).ok_or_else(|| FilterError::UndeclaredDependency {
                unit: unit.name().to_string(),
                dependency: name.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    dependencies.sort_by_key(|dependency| rank.get(dependency.name()).copied().unwrap_or(usize::MAX));

    writer.put_varint(dependencies.len() as u64);
    for dependency in dependencies {
        write_unit(writer, pool, dependency, rank, emitted)?;
    }
    Ok(())
}

fn read_unit(reader: &mut WireReader<'_>, pool: &mut SchemaPool, depth: usize) -> Result<()> {
    if depth > MAX_UNIT_DEPTH {
        return Err(FilterError::malformed("units nested too deeply"));
    }
    let name = reader.read_string()?;
    let bytes = reader.read_bytes()?;
    let dependency_count = reader.read_varint()?;
    if dependency_count > reader_remaining_bound(reader) {
        return Err(FilterError::malformed(format!(
            "unit {name} claims {dependency_count} dependencies"
        )));
    }
    for _ in 0..dependency_count {
        read_unit(reader, pool, depth + 1)?;
    }

    if bytes.is_empty() {
        if pool.contains_file(&name) {
            return Ok(());
        }
        return Err(FilterError::malformed(format!(
            "unit {name} is referenced before it is defined"
        )));
    }

    let unit = FileDescriptorProto::decode(bytes)?;
    if unit.name() != name {
        return Err(FilterError::malformed(format!(
            "unit {name} carries descriptor for {}",
            unit.name()
        )));
    }
    pool.add_file(unit)
}

/// Every nested unit takes at least three bytes, which bounds a sane count
fn reader_remaining_bound(reader: &WireReader<'_>) -> u64 {
    (reader.remaining() / 3) as u64
}
