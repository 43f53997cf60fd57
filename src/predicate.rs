//! Per-column predicates
//!
//! A [`ColumnPredicate`] is the immutable, serializable definition of one
//! test against one column. Scanning needs mutable per-row state, which lives
//! in a [`ColumnEvaluator`] created from the definition for each scan.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use prost::Message;

use crate::cache::{SchemaCache, SchemaKey};
use crate::checksum::ContentHash;
use crate::compare::{ByteComparator, CompareOp, ComparatorRegistry, Scalar};
use crate::error::{FilterError, Result};
use crate::field_path;
use crate::message::DynamicMessage;
use crate::message_match::{match_messages, MatchOp};
use crate::schema::Schema;
use crate::wire::{WireReader, WireWriter};

/// Verdict for a single column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Keep the value and continue with the row
    Include,
    /// Keep the value but read nothing more of this row
    IncludeAndStopRow,
    /// Abandon the rest of this row
    SkipRow,
}

/// What a host store drives for every row it scans.
///
/// The host feeds each cell of a row through [`on_value`](Self::on_value),
/// asks for [`row_verdict`](Self::row_verdict) once the row is done, and then
/// calls [`reset`](Self::reset) before the next row.
pub trait RowFilter {
    fn on_value(&mut self, family: &[u8], qualifier: &[u8], value: &[u8]) -> Result<ReturnCode>;

    /// Whether the row passes
    fn row_verdict(&self) -> bool;

    fn reset(&mut self);

    /// True once later values of this row can no longer change a passing
    /// verdict
    fn is_satisfied(&self) -> bool {
        false
    }
}

/// Predicate operand, typed once when the predicate is built
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    /// Encoded operand message, decoded with the predicate's schema
    Message(Bytes),
}

/// Wire form of a scalar operand
#[derive(Clone, PartialEq, prost::Message)]
struct DynamicValue {
    #[prost(oneof = "dynamic_value::Value", tags = "1, 2, 3, 4, 5, 6, 7")]
    value: Option<dynamic_value::Value>,
}

mod dynamic_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        String(String),
        #[prost(int32, tag = "2")]
        Int(i32),
        #[prost(int64, tag = "3")]
        Long(i64),
        #[prost(float, tag = "4")]
        Float(f32),
        #[prost(double, tag = "5")]
        Double(f64),
        #[prost(bool, tag = "6")]
        Bool(bool),
        #[prost(bytes = "vec", tag = "7")]
        Bytes(Vec<u8>),
    }
}

fn scalar_to_wire(scalar: &Scalar) -> DynamicValue {
    use dynamic_value::Value;
    let value = match scalar {
        Scalar::String(v) => Value::String(v.clone()),
        Scalar::Int(v) => Value::Int(*v),
        Scalar::Long(v) => Value::Long(*v),
        Scalar::Float(v) => Value::Float(*v),
        Scalar::Double(v) => Value::Double(*v),
        Scalar::Bool(v) => Value::Bool(*v),
        Scalar::Bytes(v) => Value::Bytes(v.clone()),
    };
    DynamicValue { value: Some(value) }
}

fn scalar_from_wire(value: DynamicValue) -> Result<Scalar> {
    use dynamic_value::Value;
    Ok(match value.value {
        Some(Value::String(v)) => Scalar::String(v),
        Some(Value::Int(v)) => Scalar::Int(v),
        Some(Value::Long(v)) => Scalar::Long(v),
        Some(Value::Float(v)) => Scalar::Float(v),
        Some(Value::Double(v)) => Scalar::Double(v),
        Some(Value::Bool(v)) => Scalar::Bool(v),
        Some(Value::Bytes(v)) => Scalar::Bytes(v),
        None => return Err(FilterError::InvalidOperand("operand carries no value".to_string())),
    })
}

/// One test against the values of one column
#[derive(Clone)]
pub struct ColumnPredicate {
    family: Bytes,
    qualifier: Bytes,
    compare_op: CompareOp,
    match_op: MatchOp,
    filter_if_missing: bool,
    latest_version_only: bool,
    field_spec: String,
    operand: Option<Operand>,
    key: SchemaKey,
    payload: Option<Bytes>,
    comparator: Option<Arc<dyn ByteComparator>>,
}

impl ColumnPredicate {
    pub fn family(&self) -> &[u8] {
        &self.family
    }

    pub fn qualifier(&self) -> &[u8] {
        &self.qualifier
    }

    pub fn compare_op(&self) -> CompareOp {
        self.compare_op
    }

    pub fn match_op(&self) -> MatchOp {
        self.match_op
    }

    pub fn filter_if_missing(&self) -> bool {
        self.filter_if_missing
    }

    pub fn latest_version_only(&self) -> bool {
        self.latest_version_only
    }

    pub fn field_spec(&self) -> &str {
        &self.field_spec
    }

    pub fn operand(&self) -> Option<&Operand> {
        self.operand.as_ref()
    }

    pub fn schema_key(&self) -> &SchemaKey {
        &self.key
    }

    pub fn schema_name(&self) -> &str {
        &self.key.name
    }

    /// Schema payload carried inline, if any
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn comparator(&self) -> Option<&Arc<dyn ByteComparator>> {
        self.comparator.as_ref()
    }

    pub(crate) fn take_payload(&mut self) -> Option<Bytes> {
        self.payload.take()
    }

    pub(crate) fn set_payload(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }

    /// Resolve the schema and prepare fresh row state for one scan
    pub fn evaluator(&self, cache: &SchemaCache) -> Result<ColumnEvaluator> {
        let schema = cache.resolve(&self.key, self.payload.as_deref())?;
        let operand_message = match (self.match_op, &self.operand) {
            (MatchOp::Scalar, Some(Operand::Message(_))) => {
                return Err(FilterError::InvalidOperand(
                    "scalar predicate with a message operand".to_string(),
                ))
            }
            (MatchOp::Scalar, None) if self.comparator.is_none() => {
                return Err(FilterError::InvalidOperand(format!(
                    "no operand or comparator for {}",
                    self.field_spec
                )))
            }
            (MatchOp::Scalar, _) => None,
            (_, Some(Operand::Message(bytes))) => Some(DynamicMessage::decode(&schema, bytes)?),
            (op, _) => {
                return Err(FilterError::InvalidOperand(format!(
                    "{op:?} match requires a message operand"
                )))
            }
        };
        Ok(ColumnEvaluator {
            predicate: self.clone(),
            schema,
            operand_message,
            state: RowState::NotFound,
        })
    }

    /// Standalone encoding of this predicate
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write(&mut writer);
        writer.into_inner()
    }

    pub fn from_bytes(bytes: &[u8], comparators: &ComparatorRegistry) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let predicate = Self::read(&mut reader, comparators)?;
        if !reader.is_empty() {
            return Err(FilterError::malformed("trailing bytes after predicate"));
        }
        Ok(predicate)
    }

    pub(crate) fn write(&self, writer: &mut WireWriter) {
        writer.put_bytes(&self.family);
        writer.put_bytes(&self.qualifier);
        writer.put_u8(self.compare_op.ordinal());
        writer.put_u8(self.match_op.key());
        writer.put_bool(self.filter_if_missing);
        writer.put_bool(self.latest_version_only);
        writer.put_str(&self.field_spec);

        let (scalar, message) = match &self.operand {
            Some(Operand::Scalar(scalar)) => (Some(scalar_to_wire(scalar).encode_to_vec()), None),
            Some(Operand::Message(bytes)) => (None, Some(bytes.as_ref())),
            None => (None, None),
        };
        writer.put_nullable(scalar.as_deref());
        writer.put_nullable(message);

        writer.put_str(&self.key.name);
        writer.put_u128(self.key.hash.as_u128());
        writer.put_nullable(self.payload.as_deref());

        writer.put_bool(self.comparator.is_some());
        if let Some(comparator) = &self.comparator {
            writer.put_str(comparator.kind());
            writer.put_bytes(&comparator.state());
        }
    }

    pub(crate) fn read(reader: &mut WireReader<'_>, comparators: &ComparatorRegistry) -> Result<Self> {
        let family = Bytes::copy_from_slice(reader.read_bytes()?);
        let qualifier = Bytes::copy_from_slice(reader.read_bytes()?);
        let compare_op = CompareOp::from_ordinal(reader.read_u8()?)?;
        let match_op = MatchOp::from_key(reader.read_u8()?)?;
        let filter_if_missing = reader.read_bool()?;
        let latest_version_only = reader.read_bool()?;
        let field_spec = reader.read_string()?;

        let scalar = reader.read_nullable()?;
        let message = reader.read_nullable()?;
        let operand = match (scalar, message) {
            (Some(_), Some(_)) => {
                return Err(FilterError::InvalidOperand(
                    "both scalar and message operands present".to_string(),
                ))
            }
            (Some(bytes), None) => Some(Operand::Scalar(scalar_from_wire(DynamicValue::decode(bytes)?)?)),
            (None, Some(bytes)) => Some(Operand::Message(Bytes::copy_from_slice(bytes))),
            (None, None) => None,
        };

        let name = reader.read_string()?;
        let hash = ContentHash::from_u128(reader.read_u128()?);
        let payload = reader
            .read_nullable()?
            .filter(|bytes| !bytes.is_empty())
            .map(Bytes::copy_from_slice);

        let comparator = if reader.read_bool()? {
            let kind = reader.read_string()?;
            let state = reader.read_bytes()?;
            Some(comparators.build(&kind, state)?)
        } else {
            None
        };

        Ok(Self {
            family,
            qualifier,
            compare_op,
            match_op,
            filter_if_missing,
            latest_version_only,
            field_spec,
            operand,
            key: SchemaKey::new(name, hash),
            payload,
            comparator,
        })
    }
}

impl PartialEq for ColumnPredicate {
    fn eq(&self, other: &Self) -> bool {
        let same_comparator = match (&self.comparator, &other.comparator) {
            (Some(a), Some(b)) => a.kind() == b.kind() && a.state() == b.state(),
            (None, None) => true,
            _ => false,
        };
        same_comparator
            && self.family == other.family
            && self.qualifier == other.qualifier
            && self.compare_op == other.compare_op
            && self.match_op == other.match_op
            && self.filter_if_missing == other.filter_if_missing
            && self.latest_version_only == other.latest_version_only
            && self.field_spec == other.field_spec
            && self.operand == other.operand
            && self.key == other.key
            && self.payload == other.payload
    }
}

impl fmt::Debug for ColumnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnPredicate")
            .field(
                "column",
                &format!(
                    "{}:{}",
                    String::from_utf8_lossy(&self.family),
                    String::from_utf8_lossy(&self.qualifier)
                ),
            )
            .field("match_op", &self.match_op)
            .field("compare_op", &self.compare_op)
            .field("field_spec", &self.field_spec)
            .field("operand", &self.operand)
            .field("schema", &self.key)
            .field("payload_bytes", &self.payload.as_ref().map(Bytes::len))
            .field("comparator", &self.comparator)
            .finish()
    }
}

/// Starting point for a predicate on one column.
///
/// Usually obtained from
/// [`SchemaRegistry::for_column`](crate::registry::SchemaRegistry::for_column),
/// which fills in the schema key and payload.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    family: Bytes,
    qualifier: Bytes,
    key: SchemaKey,
    payload: Option<Bytes>,
    filter_if_missing: bool,
    latest_version_only: bool,
}

impl PredicateBuilder {
    pub fn new(
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        key: SchemaKey,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            key,
            payload,
            filter_if_missing: false,
            latest_version_only: true,
        }
    }

    /// Fail rows that never contain the column (default false)
    pub fn filter_if_missing(mut self, filter_if_missing: bool) -> Self {
        self.filter_if_missing = filter_if_missing;
        self
    }

    /// Only the first version of the column decides (default true)
    pub fn latest_version_only(mut self, latest_version_only: bool) -> Self {
        self.latest_version_only = latest_version_only;
        self
    }

    fn build(
        self,
        match_op: MatchOp,
        compare_op: CompareOp,
        field_spec: &str,
        operand: Option<Operand>,
        comparator: Option<Arc<dyn ByteComparator>>,
    ) -> ColumnPredicate {
        ColumnPredicate {
            family: self.family,
            qualifier: self.qualifier,
            compare_op,
            match_op,
            filter_if_missing: self.filter_if_missing,
            latest_version_only: self.latest_version_only,
            field_spec: field_spec.to_string(),
            operand,
            key: self.key,
            payload: self.payload,
            comparator,
        }
    }

    pub fn field_compare(self, field_spec: &str, op: CompareOp, value: impl Into<Scalar>) -> ColumnPredicate {
        let operand = Some(Operand::Scalar(value.into()));
        self.build(MatchOp::Scalar, op, field_spec, operand, None)
    }

    pub fn field_eq(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::Equal, value)
    }

    pub fn field_ne(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::NotEqual, value)
    }

    pub fn field_lt(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::Less, value)
    }

    pub fn field_le(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::LessOrEqual, value)
    }

    pub fn field_gt(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::Greater, value)
    }

    pub fn field_ge(self, field_spec: &str, value: impl Into<Scalar>) -> ColumnPredicate {
        self.field_compare(field_spec, CompareOp::GreaterOrEqual, value)
    }

    /// Compare the field's canonical bytes with `comparator`
    pub fn field_byte_comparable(
        self,
        field_spec: &str,
        comparator: Arc<dyn ByteComparator>,
        op: CompareOp,
    ) -> ColumnPredicate {
        self.build(MatchOp::Scalar, op, field_spec, None, Some(comparator))
    }

    /// Match whole messages against an already encoded operand
    pub fn message_match(self, op: MatchOp, operand: impl Into<Bytes>) -> ColumnPredicate {
        let operand = Some(Operand::Message(operand.into()));
        self.build(op, CompareOp::Equal, "", operand, None)
    }

    pub fn containing_fields_matched<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::Equal, operand.encode_to_vec())
    }

    pub fn containing_fields_not_matched<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::NotEqual, operand.encode_to_vec())
    }

    pub fn is_equal_to<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::Exact, operand.encode_to_vec())
    }

    pub fn is_not_equal_to<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::NotExact, operand.encode_to_vec())
    }

    pub fn any_fields_matched<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::Any, operand.encode_to_vec())
    }

    pub fn no_fields_matched<M: Message>(self, operand: &M) -> ColumnPredicate {
        self.message_match(MatchOp::None, operand.encode_to_vec())
    }
}

/// Progress of one predicate through the current row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowState {
    #[default]
    NotFound,
    FoundUnmatched,
    FoundMatched,
}

/// Row-scoped evaluation of a [`ColumnPredicate`]
#[derive(Debug)]
pub struct ColumnEvaluator {
    predicate: ColumnPredicate,
    schema: Schema,
    operand_message: Option<DynamicMessage>,
    state: RowState,
}

impl ColumnEvaluator {
    pub fn state(&self) -> RowState {
        self.state
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn predicate(&self) -> &ColumnPredicate {
        &self.predicate
    }

    /// Test one cell value, ignoring row state
    pub fn matches(&self, value: &[u8]) -> Result<bool> {
        let message = DynamicMessage::decode(&self.schema, value)?;
        let predicate = &self.predicate;
        match (&self.operand_message, predicate.match_op) {
            (_, MatchOp::Scalar) => {
                let operand = match &predicate.operand {
                    Some(Operand::Scalar(scalar)) => Some(scalar),
                    _ => None,
                };
                field_path::compare_scalar(
                    &predicate.field_spec,
                    operand,
                    predicate.compare_op,
                    &message,
                    predicate.comparator.as_deref(),
                )
            }
            (Some(operand), op) => match_messages(operand, &message, op),
            (None, op) => Err(FilterError::InvalidOperand(format!(
                "{op:?} match requires a message operand"
            ))),
        }
    }
}

impl RowFilter for ColumnEvaluator {
    fn on_value(&mut self, family: &[u8], qualifier: &[u8], value: &[u8]) -> Result<ReturnCode> {
        match self.state {
            RowState::FoundMatched => return Ok(ReturnCode::Include),
            RowState::FoundUnmatched if self.predicate.latest_version_only => {
                return Ok(ReturnCode::SkipRow)
            }
            _ => {}
        }
        if family != self.predicate.family.as_ref() || qualifier != self.predicate.qualifier.as_ref() {
            return Ok(ReturnCode::Include);
        }

        if self.matches(value)? {
            self.state = RowState::FoundMatched;
            Ok(ReturnCode::Include)
        } else {
            self.state = RowState::FoundUnmatched;
            if self.predicate.latest_version_only {
                Ok(ReturnCode::SkipRow)
            } else {
                Ok(ReturnCode::Include)
            }
        }
    }

    fn row_verdict(&self) -> bool {
        match self.state {
            RowState::FoundMatched => true,
            RowState::FoundUnmatched => false,
            RowState::NotFound => !self.predicate.filter_if_missing,
        }
    }

    fn reset(&mut self) {
        self.state = RowState::NotFound;
    }

    fn is_satisfied(&self) -> bool {
        self.state == RowState::FoundMatched
    }
}
