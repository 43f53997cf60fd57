//! Dotted field paths
//!
//! A path such as `child_proto.child_proto_val` walks nested messages one
//! segment at a time and ends on a scalar field.

use crate::compare::{ByteComparator, CompareOp, Scalar};
use crate::error::{FilterError, Result};
use crate::message::{DynamicMessage, Value};
use crate::schema::{FieldDef, Schema};

/// Extract the scalar at `field_spec`, or `None` when it is absent.
///
/// A field that is not present on the wire falls back to its declared
/// default. Enum values come back as their symbol names. A repeated field is
/// an error only when it is present.
pub fn extract(field_spec: &str, message: &DynamicMessage) -> Result<Option<Scalar>> {
    let trimmed = field_spec.trim_start_matches('.');
    let (head, rest) = match trimmed.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => (trimmed, ""),
    };
    let schema = message.schema();
    let Some(field) = schema.field_by_name(head) else {
        return Ok(None);
    };
    match message.get(field.number) {
        Some(Value::Message(nested)) => {
            if rest.trim_matches('.').is_empty() {
                return Err(FilterError::PathEndsOnMessage {
                    path: field_spec.to_string(),
                    field: field.full_name.clone(),
                });
            }
            extract(rest, nested)
        }
        Some(value) => to_scalar(schema, field, value).map(Some),
        None => match &field.default {
            Some(default) => to_scalar(schema, field, default).map(Some),
            None => Ok(None),
        },
    }
}

fn to_scalar(schema: &Schema, field: &FieldDef, value: &Value) -> Result<Scalar> {
    let scalar = match value {
        Value::Bool(v) => Scalar::Bool(*v),
        Value::I32(v) => Scalar::Int(*v),
        Value::U32(v) => Scalar::from(*v),
        Value::I64(v) => Scalar::Long(*v),
        Value::U64(v) => Scalar::from(*v),
        Value::F32(v) => Scalar::Float(*v),
        Value::F64(v) => Scalar::Double(*v),
        Value::String(v) => Scalar::String(v.clone()),
        Value::Bytes(v) => Scalar::Bytes(v.clone()),
        Value::EnumNumber(number) => {
            let symbol = schema.enum_def(field).and_then(|e| e.symbol(*number));
            Scalar::String(symbol.map(str::to_string).unwrap_or_else(|| number.to_string()))
        }
        Value::List(_) => {
            return Err(FilterError::RepeatedField {
                field: field.full_name.clone(),
            })
        }
        Value::Message(_) => {
            return Err(FilterError::PathEndsOnMessage {
                path: field.name.clone(),
                field: field.full_name.clone(),
            })
        }
    };
    Ok(scalar)
}

/// Compare the value at `field_spec` against `operand`.
///
/// An absent value only satisfies [`CompareOp::NotEqual`]. With a byte
/// comparator the operand is ignored and the comparator's result is
/// interpreted instead.
pub fn compare_scalar(
    field_spec: &str,
    operand: Option<&Scalar>,
    op: CompareOp,
    message: &DynamicMessage,
    comparator: Option<&dyn ByteComparator>,
) -> Result<bool> {
    let Some(value) = extract(field_spec, message)? else {
        return Ok(op == CompareOp::NotEqual);
    };
    match (comparator, operand) {
        (Some(comparator), _) => Ok(op.accepts(comparator.compare_to(&value.canonical_bytes()))),
        (None, Some(operand)) => Ok(op.accepts_ordering(value.compare_to_operand(operand)?)),
        (None, None) => Err(FilterError::InvalidOperand(format!(
            "no operand or comparator for {field_spec}"
        ))),
    }
}
