//! Reconstructed message schemas
//!
//! A [`SchemaPool`] is built from protobuf file descriptors, one unit at a
//! time and dependencies first. It resolves every field's type once, so the
//! matchers can walk messages without touching descriptor protos again. A
//! [`Schema`] is a cheap handle to one message type inside a shared pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use serde::Serialize;

use crate::error::{FilterError, Result};
use crate::message::Value;

/// Resolved type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    /// Index of the enum in its pool
    Enum(usize),
    /// Index of the message in its pool
    Message(usize),
}

impl FieldKind {
    /// Whether values of this kind may use packed encoding
    pub fn is_packable(self) -> bool {
        !matches!(self, FieldKind::String | FieldKind::Bytes | FieldKind::Message(_))
    }

    pub fn type_name(self) -> &'static str {
        match self {
            FieldKind::Double => "double",
            FieldKind::Float => "float",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Sint32 => "sint32",
            FieldKind::Sint64 => "sint64",
            FieldKind::Fixed32 => "fixed32",
            FieldKind::Fixed64 => "fixed64",
            FieldKind::Sfixed32 => "sfixed32",
            FieldKind::Sfixed64 => "sfixed64",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
            FieldKind::Enum(_) => "enum",
            FieldKind::Message(_) => "message",
        }
    }
}

/// A single field of a message
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    /// `package.Message.field`
    pub full_name: String,
    pub number: u32,
    pub kind: FieldKind,
    pub repeated: bool,
    /// Explicitly declared default, if any
    pub default: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct MessageDef {
    full_name: String,
    file: usize,
    /// Index path from the file's top-level messages through nested types
    path: Vec<usize>,
    fields: Vec<FieldDef>,
    by_number: HashMap<u32, usize>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    full_name: String,
    values: Vec<(String, i32)>,
}

impl EnumDef {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Symbol for a number; the first declared alias wins
    pub fn symbol(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }

    pub fn number(&self, symbol: &str) -> Option<i32> {
        self.values.iter().find(|(name, _)| name == symbol).map(|(_, n)| *n)
    }
}

#[derive(Debug, Clone, Copy)]
enum TypeRef {
    Message(usize),
    Enum(usize),
}

/// Every unit, message and enum reconstructed so far
#[derive(Debug, Default, Clone)]
pub struct SchemaPool {
    files: Vec<FileDescriptorProto>,
    files_by_name: HashMap<String, usize>,
    messages: Vec<MessageDef>,
    enums: Vec<EnumDef>,
    types: HashMap<String, TypeRef>,
}

impl SchemaPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_file(&self, name: &str) -> bool {
        self.files_by_name.contains_key(name)
    }

    pub fn file(&self, name: &str) -> Option<&FileDescriptorProto> {
        self.files_by_name.get(name).map(|&i| &self.files[i])
    }

    pub fn files(&self) -> &[FileDescriptorProto] {
        &self.files
    }

    /// Fully-qualified names of every message in the pool
    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.full_name.as_str())
    }

    /// Add one unit. All of its dependencies must already be in the pool.
    ///
    /// Adding a unit whose name is already present is a no-op. On error the
    /// pool is left as it was before the call.
    pub fn add_file(&mut self, file: FileDescriptorProto) -> Result<()> {
        let file_name = file.name().to_string();
        if self.files_by_name.contains_key(&file_name) {
            return Ok(());
        }
        if let Some(missing) = file
            .dependency
            .iter()
            .find(|dependency| !self.files_by_name.contains_key(dependency.as_str()))
        {
            return Err(FilterError::UndeclaredDependency {
                unit: file_name,
                dependency: missing.clone(),
            });
        }

        let (messages_before, enums_before) = (self.messages.len(), self.enums.len());
        let mut added = Vec::new();
        let result = self.register_file(&file, &mut added);
        if let Err(e) = result {
            self.messages.truncate(messages_before);
            self.enums.truncate(enums_before);
            for name in added {
                self.types.remove(&name);
            }
            return Err(e);
        }

        self.files_by_name.insert(file_name, self.files.len());
        self.files.push(file);
        Ok(())
    }

    fn register_file(&mut self, file: &FileDescriptorProto, added: &mut Vec<String>) -> Result<()> {
        let file_index = self.files.len();
        let package = file.package();
        let mut pending = Vec::new();

        for (i, message) in file.message_type.iter().enumerate() {
            self.register_message(message, package, file_index, vec![i], &mut pending, added)?;
        }
        for enum_type in &file.enum_type {
            self.register_enum(enum_type, package, added)?;
        }

        for (index, message) in pending {
            let scope = self.messages[index].full_name.clone();
            let mut fields = Vec::with_capacity(message.field.len());
            let mut by_number = HashMap::with_capacity(message.field.len());
            for field in &message.field {
                let def = self.resolve_field(&scope, field)?;
                by_number.insert(def.number, fields.len());
                fields.push(def);
            }
            let def = &mut self.messages[index];
            def.fields = fields;
            def.by_number = by_number;
        }
        Ok(())
    }

    fn register_message<'f>(
        &mut self,
        message: &'f DescriptorProto,
        scope: &str,
        file: usize,
        path: Vec<usize>,
        pending: &mut Vec<(usize, &'f DescriptorProto)>,
        added: &mut Vec<String>,
    ) -> Result<()> {
        let full_name = qualify(scope, message.name());
        let index = self.messages.len();
        self.claim_name(&full_name, TypeRef::Message(index), added)?;
        self.messages.push(MessageDef {
            full_name: full_name.clone(),
            file,
            path: path.clone(),
            fields: Vec::new(),
            by_number: HashMap::new(),
        });
        pending.push((index, message));

        for (i, nested) in message.nested_type.iter().enumerate() {
            let mut nested_path = path.clone();
            nested_path.push(i);
            self.register_message(nested, &full_name, file, nested_path, pending, added)?;
        }
        for enum_type in &message.enum_type {
            self.register_enum(enum_type, &full_name, added)?;
        }
        Ok(())
    }

    fn register_enum(&mut self, enum_type: &EnumDescriptorProto, scope: &str, added: &mut Vec<String>) -> Result<()> {
        let full_name = qualify(scope, enum_type.name());
        self.claim_name(&full_name, TypeRef::Enum(self.enums.len()), added)?;
        self.enums.push(EnumDef {
            full_name,
            values: enum_type
                .value
                .iter()
                .map(|v| (v.name().to_string(), v.number()))
                .collect(),
        });
        Ok(())
    }

    fn claim_name(&mut self, full_name: &str, type_ref: TypeRef, added: &mut Vec<String>) -> Result<()> {
        if self.types.contains_key(full_name) {
            return Err(FilterError::malformed(format!("duplicate type {full_name}")));
        }
        self.types.insert(full_name.to_string(), type_ref);
        added.push(full_name.to_string());
        Ok(())
    }

    fn resolve_field(&self, scope: &str, field: &FieldDescriptorProto) -> Result<FieldDef> {
        let full_name = qualify(scope, field.name());
        let kind = match field.r#type {
            None => match self.resolve_type(scope, field.type_name())? {
                TypeRef::Message(i) => FieldKind::Message(i),
                TypeRef::Enum(i) => FieldKind::Enum(i),
            },
            Some(_) => match field.r#type() {
                Type::Double => FieldKind::Double,
                Type::Float => FieldKind::Float,
                Type::Int64 => FieldKind::Int64,
                Type::Uint64 => FieldKind::Uint64,
                Type::Int32 => FieldKind::Int32,
                Type::Fixed64 => FieldKind::Fixed64,
                Type::Fixed32 => FieldKind::Fixed32,
                Type::Bool => FieldKind::Bool,
                Type::String => FieldKind::String,
                Type::Bytes => FieldKind::Bytes,
                Type::Uint32 => FieldKind::Uint32,
                Type::Sfixed32 => FieldKind::Sfixed32,
                Type::Sfixed64 => FieldKind::Sfixed64,
                Type::Sint32 => FieldKind::Sint32,
                Type::Sint64 => FieldKind::Sint64,
                Type::Message => match self.resolve_type(scope, field.type_name())? {
                    TypeRef::Message(i) => FieldKind::Message(i),
                    TypeRef::Enum(_) => return Err(self.unresolved(scope, field)),
                },
                Type::Enum => match self.resolve_type(scope, field.type_name())? {
                    TypeRef::Enum(i) => FieldKind::Enum(i),
                    TypeRef::Message(_) => return Err(self.unresolved(scope, field)),
                },
                Type::Group => {
                    return Err(FilterError::UnsupportedFieldType {
                        field: full_name,
                        kind: "group".to_string(),
                    })
                }
            },
        };

        let default = match &field.default_value {
            Some(text) => Some(self.parse_default(&full_name, kind, text)?),
            None => None,
        };

        Ok(FieldDef {
            name: field.name().to_string(),
            full_name,
            number: u32::try_from(field.number())
                .map_err(|_| FilterError::malformed(format!("negative field number in {scope}")))?,
            kind,
            repeated: field.label() == Label::Repeated,
            default,
        })
    }

    fn unresolved(&self, scope: &str, field: &FieldDescriptorProto) -> FilterError {
        FilterError::UnresolvedType {
            type_name: field.type_name().to_string(),
            scope: scope.to_string(),
        }
    }

    /// Resolve a type reference the way protoc scopes names: a leading dot
    /// means fully-qualified, otherwise search outward from `scope`.
    fn resolve_type(&self, scope: &str, type_name: &str) -> Result<TypeRef> {
        if let Some(absolute) = type_name.strip_prefix('.') {
            return self.types.get(absolute).copied().ok_or_else(|| FilterError::UnresolvedType {
                type_name: type_name.to_string(),
                scope: scope.to_string(),
            });
        }
        let mut current = scope;
        loop {
            if let Some(found) = self.types.get(&qualify(current, type_name)) {
                return Ok(*found);
            }
            if current.is_empty() {
                break;
            }
            current = current.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        }
        Err(FilterError::UnresolvedType {
            type_name: type_name.to_string(),
            scope: scope.to_string(),
        })
    }

    fn parse_default(&self, field: &str, kind: FieldKind, text: &str) -> Result<Value> {
        let invalid = || FilterError::InvalidDefault {
            field: field.to_string(),
            value: text.to_string(),
        };
        let value = match kind {
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => {
                Value::I32(text.parse().map_err(|_| invalid())?)
            }
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
                Value::I64(text.parse().map_err(|_| invalid())?)
            }
            FieldKind::Uint32 | FieldKind::Fixed32 => Value::U32(text.parse().map_err(|_| invalid())?),
            FieldKind::Uint64 | FieldKind::Fixed64 => Value::U64(text.parse().map_err(|_| invalid())?),
            FieldKind::Float => Value::F32(parse_float(text).ok_or_else(invalid)? as f32),
            FieldKind::Double => Value::F64(parse_float(text).ok_or_else(invalid)?),
            FieldKind::Bool => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            FieldKind::String => Value::String(text.to_string()),
            FieldKind::Bytes => Value::Bytes(unescape_bytes(text).ok_or_else(invalid)?),
            FieldKind::Enum(i) => Value::EnumNumber(self.enums[i].number(text).ok_or_else(invalid)?),
            FieldKind::Message(_) => return Err(invalid()),
        };
        Ok(value)
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Undo the C-style escaping protoc applies to `bytes` defaults
fn unescape_bytes(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next()? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'x' => {
                let mut value = 0u8;
                for _ in 0..2 {
                    let digit = (*bytes.peek()? as char).to_digit(16)?;
                    bytes.next();
                    value = value.checked_mul(16)?.checked_add(digit as u8)?;
                }
                out.push(value);
            }
            first @ b'0'..=b'7' => {
                let mut value = u32::from(first - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(u8::try_from(value).ok()?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Handle to one message type inside a shared [`SchemaPool`]
#[derive(Clone)]
pub struct Schema {
    pool: Arc<SchemaPool>,
    index: usize,
}

impl Schema {
    /// Look up a message by fully-qualified name (no leading dot)
    pub fn from_pool(pool: Arc<SchemaPool>, full_name: &str) -> Option<Self> {
        match pool.types.get(full_name.trim_start_matches('.')) {
            Some(TypeRef::Message(index)) => {
                let index = *index;
                Some(Self { pool, index })
            }
            _ => None,
        }
    }

    fn def(&self) -> &MessageDef {
        &self.pool.messages[self.index]
    }

    pub fn full_name(&self) -> &str {
        &self.def().full_name
    }

    pub fn pool(&self) -> &Arc<SchemaPool> {
        &self.pool
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.def().fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.def().fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDef> {
        let def = self.def();
        def.by_number.get(&number).map(|&i| &def.fields[i])
    }

    /// Schema of a message-typed field's values
    pub fn message_schema(&self, field: &FieldDef) -> Option<Schema> {
        match field.kind {
            FieldKind::Message(index) => Some(Schema {
                pool: Arc::clone(&self.pool),
                index,
            }),
            _ => None,
        }
    }

    pub fn enum_def(&self, field: &FieldDef) -> Option<&EnumDef> {
        match field.kind {
            FieldKind::Enum(index) => Some(&self.pool.enums[index]),
            _ => None,
        }
    }

    /// True when no field refers to another named message or enum type
    pub fn is_self_contained(&self) -> bool {
        self.fields()
            .iter()
            .all(|f| !matches!(f.kind, FieldKind::Enum(_) | FieldKind::Message(_)))
    }

    /// The unit that declares this message
    pub fn file(&self) -> &FileDescriptorProto {
        &self.pool.files[self.def().file]
    }

    /// The descriptor proto this message was built from
    pub fn descriptor_proto(&self) -> &DescriptorProto {
        let def = self.def();
        let file = &self.pool.files[def.file];
        let mut message = &file.message_type[def.path[0]];
        for &i in &def.path[1..] {
            message = &message.nested_type[i];
        }
        message
    }

    /// Serializable summary, used by the CLI
    pub fn describe(&self) -> SchemaDescription {
        SchemaDescription {
            name: self.full_name().to_string(),
            unit: self.file().name().to_string(),
            fields: self
                .fields()
                .iter()
                .map(|f| FieldDescription {
                    name: f.name.clone(),
                    number: f.number,
                    kind: match f.kind {
                        FieldKind::Message(i) => self.pool.messages[i].full_name.clone(),
                        FieldKind::Enum(i) => self.pool.enums[i].full_name.clone(),
                        other => other.type_name().to_string(),
                    },
                    repeated: f.repeated,
                    default: f.default.as_ref().map(|v| format!("{v:?}")),
                })
                .collect(),
        }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.pool, &other.pool)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("name", &self.full_name()).finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaDescription {
    pub name: String,
    pub unit: String,
    pub fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDescription {
    pub name: String,
    pub number: u32,
    pub kind: String,
    pub repeated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}
