//! Whole-message matching
//!
//! Compares the explicitly set fields of an operand message with those of a
//! cell value. Only the operand's fields are checked one by one; the
//! `Exact` modes additionally require the value to set nothing else.

use std::collections::HashMap;

use crate::error::{FilterError, Result};
use crate::message::DynamicMessage;

/// Matching mode of a column predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    /// Every operand field is equal in the value
    Equal,
    /// Some operand field differs from the value
    NotEqual,
    /// The value sets exactly the operand's fields, all equal
    Exact,
    NotExact,
    /// At least one operand field is equal
    Any,
    /// No operand field is equal
    None,
    /// Compare one field against a scalar operand instead
    Scalar,
}

impl MatchOp {
    /// Stable wire key
    pub fn key(self) -> u8 {
        match self {
            MatchOp::Equal => 0,
            MatchOp::NotEqual => 1,
            MatchOp::Exact => 2,
            MatchOp::NotExact => 3,
            MatchOp::Any => 4,
            MatchOp::None => 5,
            MatchOp::Scalar => 6,
        }
    }

    pub fn from_key(key: u8) -> Result<Self> {
        Ok(match key {
            0 => MatchOp::Equal,
            1 => MatchOp::NotEqual,
            2 => MatchOp::Exact,
            3 => MatchOp::NotExact,
            4 => MatchOp::Any,
            5 => MatchOp::None,
            6 => MatchOp::Scalar,
            other => return Err(FilterError::UnknownMatchOp(other)),
        })
    }
}

pub fn match_messages(operand: &DynamicMessage, value: &DynamicMessage, op: MatchOp) -> Result<bool> {
    if op == MatchOp::Scalar {
        return Err(FilterError::ScalarMessageMatch);
    }

    let mut remaining: HashMap<&str, _> = value
        .present_fields()
        .map(|(field, v)| (field.full_name.as_str(), v))
        .collect();
    let mut has_equality = false;
    let mut has_inequality = false;

    for (field, expected) in operand.present_fields() {
        let key = field.full_name.as_str();
        if remaining.get(key) == Some(&expected) {
            has_equality = true;
            if op == MatchOp::Any {
                return Ok(true);
            }
        } else if matches!(op, MatchOp::Equal | MatchOp::NotEqual) {
            return Ok(op == MatchOp::NotEqual);
        } else {
            has_inequality = true;
        }
        remaining.remove(key);
    }

    Ok(match op {
        MatchOp::Exact | MatchOp::NotExact => {
            let exact = remaining.is_empty() && !has_inequality;
            exact == (op == MatchOp::Exact)
        }
        MatchOp::None => !has_equality,
        _ => op == MatchOp::Equal,
    })
}
