//! Schema-driven decoding of protobuf messages
//!
//! Cell values arrive as raw wire-format bytes. [`DynamicMessage::decode`]
//! reads them against a reconstructed [`Schema`], keeping only the fields that
//! were explicitly present on the wire. Unknown field numbers are skipped.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use bytes::Buf;
use prost::encoding::{decode_key, decode_varint, WireType};

use crate::error::{FilterError, Result};
use crate::schema::{FieldDef, FieldKind, Schema};

/// Nesting limit for embedded messages
const MAX_DEPTH: usize = 100;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Raw enum number; symbol lookup goes through the field's enum
    EnumNumber(i32),
    Message(Box<DynamicMessage>),
    /// Every occurrence of a repeated field, in wire order
    List(Vec<Value>),
}

/// A message decoded without static bindings
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    schema: Schema,
    fields: BTreeMap<u32, Value>,
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.schema.full_name() == other.schema.full_name() && self.fields == other.fields
    }
}

impl DynamicMessage {
    pub fn decode(schema: &Schema, bytes: &[u8]) -> Result<Self> {
        decode_message(schema, bytes, 0)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Value of an explicitly present field
    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .field_by_name(name)
            .and_then(|field| self.fields.get(&field.number))
    }

    /// Explicitly present fields, in field-number order
    pub fn present_fields(&self) -> impl Iterator<Item = (&FieldDef, &Value)> {
        self.fields.iter().filter_map(move |(number, value)| {
            self.schema.field_by_number(*number).map(|field| (field, value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Protobuf merge: nested messages merge, repeated fields append, other
    /// fields are replaced
    pub fn merge_from(&mut self, other: DynamicMessage) {
        for (number, value) in other.fields {
            let value = match (self.fields.get_mut(&number), value) {
                (Some(Value::List(existing)), Value::List(more)) => {
                    existing.extend(more);
                    continue;
                }
                (_, value) => value,
            };
            insert_singular(&mut self.fields, number, value);
        }
    }
}

fn decode_message(schema: &Schema, bytes: &[u8], depth: usize) -> Result<DynamicMessage> {
    if depth > MAX_DEPTH {
        return Err(malformed(schema, "nesting too deep"));
    }
    let mut buf = bytes;
    let mut fields = BTreeMap::new();
    let mut lists: BTreeMap<u32, Vec<Value>> = BTreeMap::new();

    while buf.has_remaining() {
        let (number, wire_type) = decode_key(&mut buf)?;
        let Some(field) = schema.field_by_number(number) else {
            skip_field(schema, wire_type, &mut buf)?;
            continue;
        };

        if field.repeated && wire_type == WireType::LengthDelimited && field.kind.is_packable() {
            let len = read_len(schema, &mut buf)?;
            let (mut packed, rest) = buf.split_at(len);
            buf = rest;
            let list = lists.entry(field.number).or_default();
            while packed.has_remaining() {
                list.push(read_scalar(schema, field, expected_wire_type(field.kind), &mut packed)?);
            }
            continue;
        }

        let value = match field.kind {
            FieldKind::Message(_) => {
                check_wire_type(schema, field, wire_type, WireType::LengthDelimited)?;
                let len = read_len(schema, &mut buf)?;
                let (inner, rest) = buf.split_at(len);
                buf = rest;
                let nested = schema
                    .message_schema(field)
                    .ok_or_else(|| malformed(schema, "message field without schema"))?;
                Value::Message(Box::new(decode_message(&nested, inner, depth + 1)?))
            }
            kind => {
                check_wire_type(schema, field, wire_type, expected_wire_type(kind))?;
                read_scalar(schema, field, wire_type, &mut buf)?
            }
        };

        if field.repeated {
            lists.entry(field.number).or_default().push(value);
        } else {
            insert_singular(&mut fields, field.number, value);
        }
    }

    for (number, list) in lists {
        fields.insert(number, Value::List(list));
    }
    Ok(DynamicMessage {
        schema: schema.clone(),
        fields,
    })
}

/// Later occurrences of a singular message field merge into the earlier one;
/// any other singular field takes the last value seen.
fn insert_singular(fields: &mut BTreeMap<u32, Value>, number: u32, value: Value) {
    match (fields.entry(number), value) {
        (Entry::Occupied(mut entry), Value::Message(next)) => match entry.get_mut() {
            Value::Message(existing) => existing.merge_from(*next),
            other => *other = Value::Message(next),
        },
        (Entry::Occupied(mut entry), value) => {
            entry.insert(value);
        }
        (Entry::Vacant(entry), value) => {
            entry.insert(value);
        }
    }
}

fn expected_wire_type(kind: FieldKind) -> WireType {
    match kind {
        FieldKind::Double | FieldKind::Fixed64 | FieldKind::Sfixed64 => WireType::SixtyFourBit,
        FieldKind::Float | FieldKind::Fixed32 | FieldKind::Sfixed32 => WireType::ThirtyTwoBit,
        FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) => WireType::LengthDelimited,
        _ => WireType::Varint,
    }
}

fn check_wire_type(schema: &Schema, field: &FieldDef, actual: WireType, expected: WireType) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(malformed(
            schema,
            format!("field {} has wire type {actual:?}, expected {expected:?}", field.name),
        ))
    }
}

fn read_scalar(schema: &Schema, field: &FieldDef, wire_type: WireType, buf: &mut &[u8]) -> Result<Value> {
    let value = match wire_type {
        WireType::Varint => {
            let raw = decode_varint(buf)?;
            match field.kind {
                FieldKind::Int32 => Value::I32(raw as i32),
                FieldKind::Int64 => Value::I64(raw as i64),
                FieldKind::Uint32 => Value::U32(raw as u32),
                FieldKind::Uint64 => Value::U64(raw),
                FieldKind::Sint32 => {
                    let raw = raw as u32;
                    Value::I32(((raw >> 1) as i32) ^ -((raw & 1) as i32))
                }
                FieldKind::Sint64 => Value::I64(((raw >> 1) as i64) ^ -((raw & 1) as i64)),
                FieldKind::Bool => Value::Bool(raw != 0),
                FieldKind::Enum(_) => Value::EnumNumber(raw as i32),
                _ => return Err(malformed(schema, format!("field {} is not a varint", field.name))),
            }
        }
        WireType::ThirtyTwoBit => {
            let raw = take::<4>(schema, buf)?;
            match field.kind {
                FieldKind::Float => Value::F32(f32::from_le_bytes(raw)),
                FieldKind::Fixed32 => Value::U32(u32::from_le_bytes(raw)),
                FieldKind::Sfixed32 => Value::I32(i32::from_le_bytes(raw)),
                _ => return Err(malformed(schema, format!("field {} is not 32-bit", field.name))),
            }
        }
        WireType::SixtyFourBit => {
            let raw = take::<8>(schema, buf)?;
            match field.kind {
                FieldKind::Double => Value::F64(f64::from_le_bytes(raw)),
                FieldKind::Fixed64 => Value::U64(u64::from_le_bytes(raw)),
                FieldKind::Sfixed64 => Value::I64(i64::from_le_bytes(raw)),
                _ => return Err(malformed(schema, format!("field {} is not 64-bit", field.name))),
            }
        }
        WireType::LengthDelimited => {
            let len = read_len(schema, buf)?;
            let current: &[u8] = *buf;
            let (raw, rest) = current.split_at(len);
            *buf = rest;
            match field.kind {
                FieldKind::String => Value::String(
                    String::from_utf8(raw.to_vec())
                        .map_err(|_| malformed(schema, format!("field {} is not valid UTF-8", field.name)))?,
                ),
                FieldKind::Bytes => Value::Bytes(raw.to_vec()),
                _ => return Err(malformed(schema, format!("field {} is not length-delimited", field.name))),
            }
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(malformed(schema, "group encoding is not supported"))
        }
    };
    Ok(value)
}

fn read_len(schema: &Schema, buf: &mut &[u8]) -> Result<usize> {
    let len = decode_varint(buf)?;
    usize::try_from(len)
        .ok()
        .filter(|len| *len <= buf.len())
        .ok_or_else(|| malformed(schema, format!("length {len} past end of buffer")))
}

fn take<const N: usize>(schema: &Schema, buf: &mut &[u8]) -> Result<[u8; N]> {
    if buf.len() < N {
        return Err(malformed(schema, "fixed-width value past end of buffer"));
    }
    let mut raw = [0u8; N];
    raw.copy_from_slice(&buf[..N]);
    buf.advance(N);
    Ok(raw)
}

fn skip_field(schema: &Schema, wire_type: WireType, buf: &mut &[u8]) -> Result<()> {
    match wire_type {
        WireType::Varint => {
            decode_varint(buf)?;
        }
        WireType::ThirtyTwoBit => {
            take::<4>(schema, buf)?;
        }
        WireType::SixtyFourBit => {
            take::<8>(schema, buf)?;
        }
        WireType::LengthDelimited => {
            let len = read_len(schema, buf)?;
            buf.advance(len);
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(malformed(schema, "group encoding is not supported"))
        }
    }
    Ok(())
}

fn malformed(schema: &Schema, reason: impl Into<String>) -> FilterError {
    FilterError::MalformedMessage {
        message: schema.full_name().to_string(),
        reason: reason.into(),
    }
}
