//! Scalar comparison
//!
//! Extracted field values and predicate operands share one tagged union,
//! [`Scalar`]. Comparison dispatches on the operand's tag. A
//! [`ByteComparator`] replaces that dispatch with a comparison over the
//! value's canonical bytes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{FilterError, Result};

/// A typed scalar value or operand
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::String(_) => "string",
            Scalar::Int(_) => "int32",
            Scalar::Long(_) => "int64",
            Scalar::Float(_) => "float",
            Scalar::Double(_) => "double",
            Scalar::Bool(_) => "bool",
            Scalar::Bytes(_) => "bytes",
        }
    }

    /// Big-endian bytes handed to byte comparators
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Scalar::String(s) => s.as_bytes().to_vec(),
            Scalar::Int(v) => v.to_be_bytes().to_vec(),
            Scalar::Long(v) => v.to_be_bytes().to_vec(),
            Scalar::Float(v) => v.to_bits().to_be_bytes().to_vec(),
            Scalar::Double(v) => v.to_bits().to_be_bytes().to_vec(),
            Scalar::Bool(v) => vec![if *v { 0xFF } else { 0x00 }],
            Scalar::Bytes(b) => b.clone(),
        }
    }

    /// Order `self`, an extracted value, against `operand`.
    ///
    /// A string operand compares against the text of any value. Every other
    /// operand requires a value of the same type.
    pub fn compare_to_operand(&self, operand: &Scalar) -> Result<Ordering> {
        let ordering = match (self, operand) {
            (value, Scalar::String(expected)) => match value {
                Scalar::String(actual) => actual.as_str().cmp(expected.as_str()),
                other => other.to_string().as_str().cmp(expected.as_str()),
            },
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Long(a), Scalar::Long(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Double(a), Scalar::Double(b)) => a.total_cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a.as_slice().cmp(b.as_slice()),
            (value, operand) => {
                return Err(FilterError::TypeMismatch {
                    operand: operand.type_name(),
                    scalar: value.type_name(),
                })
            }
        };
        Ok(ordering)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Long(v) => write!(f, "{v}"),
            Scalar::Float(v) => write_float(f, f64::from(*v), format!("{v}"), format!("{v:e}")),
            Scalar::Double(v) => write_float(f, *v, format!("{v}"), format!("{v:e}")),
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// Floats render as JVM `String.valueOf` does (`2.0`, `1.0E10`, `NaN`), so
/// string operands written against that text keep matching.
fn write_float(f: &mut fmt::Formatter<'_>, value: f64, plain: String, scientific: String) -> fmt::Result {
    if value.is_nan() {
        return f.write_str("NaN");
    }
    if value.is_infinite() {
        return f.write_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-3..1e7).contains(&magnitude) {
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
        let point = if mantissa.contains('.') { "" } else { ".0" };
        return write!(f, "{mantissa}{point}E{exponent}");
    }
    let point = if plain.contains('.') { "" } else { ".0" };
    write!(f, "{plain}{point}")
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v)
    }
}

/// Unsigned 32-bit values share the signed representation
impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int(v as i32)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Long(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::Long(v as i64)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Double(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}

impl From<&[u8]> for Scalar {
    fn from(v: &[u8]) -> Self {
        Scalar::Bytes(v.to_vec())
    }
}

/// How an ordering is turned into a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
}

impl CompareOp {
    const ALL: [CompareOp; 6] = [
        CompareOp::Less,
        CompareOp::LessOrEqual,
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::GreaterOrEqual,
        CompareOp::Greater,
    ];

    /// Stable wire ordinal
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(ordinal))
            .copied()
            .ok_or(FilterError::UnknownCompareOp(ordinal))
    }

    /// Interpret a signed comparison result
    pub fn accepts(self, result: i32) -> bool {
        match self {
            CompareOp::Less => result < 0,
            CompareOp::LessOrEqual => result <= 0,
            CompareOp::Equal => result == 0,
            CompareOp::NotEqual => result != 0,
            CompareOp::GreaterOrEqual => result >= 0,
            CompareOp::Greater => result > 0,
        }
    }

    pub fn accepts_ordering(self, ordering: Ordering) -> bool {
        self.accepts(sign(ordering))
    }
}

/// Pluggable comparison over a value's canonical bytes
pub trait ByteComparator: fmt::Debug + Send + Sync {
    /// Stable name used to rebuild the comparator after transport
    fn kind(&self) -> &str;

    /// Serialized state, handed back to the constructor registered for
    /// [`kind`](Self::kind)
    fn state(&self) -> Vec<u8>;

    /// Signed comparison result; the sign is interpreted by [`CompareOp`]
    fn compare_to(&self, value: &[u8]) -> i32;
}

fn sign(ordering: Ordering) -> i32 {
    ordering as i32
}

/// Lexicographic comparison of a fixed value against the cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryComparator {
    value: Vec<u8>,
}

impl BinaryComparator {
    pub const KIND: &'static str = "binary";

    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self { value: value.into() }
    }
}

impl ByteComparator for BinaryComparator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn state(&self) -> Vec<u8> {
        self.value.clone()
    }

    fn compare_to(&self, value: &[u8]) -> i32 {
        sign(self.value.as_slice().cmp(value))
    }
}

/// Like [`BinaryComparator`] but only over the first `value.len()` bytes of
/// the cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPrefixComparator {
    value: Vec<u8>,
}

impl BinaryPrefixComparator {
    pub const KIND: &'static str = "binary_prefix";

    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self { value: value.into() }
    }
}

impl ByteComparator for BinaryPrefixComparator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn state(&self) -> Vec<u8> {
        self.value.clone()
    }

    fn compare_to(&self, value: &[u8]) -> i32 {
        let prefix = &value[..value.len().min(self.value.len())];
        sign(self.value.as_slice().cmp(prefix))
    }
}

/// Case-insensitive containment: 0 when the cell contains the substring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringComparator {
    needle: String,
}

impl SubstringComparator {
    pub const KIND: &'static str = "substring";

    pub fn new(substring: &str) -> Self {
        Self {
            needle: substring.to_lowercase(),
        }
    }
}

impl ByteComparator for SubstringComparator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn state(&self) -> Vec<u8> {
        self.needle.as_bytes().to_vec()
    }

    fn compare_to(&self, value: &[u8]) -> i32 {
        if String::from_utf8_lossy(value).to_lowercase().contains(&self.needle) {
            0
        } else {
            1
        }
    }
}

/// 0 when the cell, read as UTF-8, matches the pattern
#[derive(Debug, Clone)]
pub struct RegexComparator {
    pattern: Regex,
}

impl RegexComparator {
    pub const KIND: &'static str = "regex";

    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl ByteComparator for RegexComparator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn state(&self) -> Vec<u8> {
        self.pattern.as_str().as_bytes().to_vec()
    }

    fn compare_to(&self, value: &[u8]) -> i32 {
        if self.pattern.is_match(&String::from_utf8_lossy(value)) {
            0
        } else {
            1
        }
    }
}

/// Rebuilds a comparator from its serialized state
pub type ComparatorConstructor = fn(&[u8]) -> Result<Arc<dyn ByteComparator>>;

/// Maps comparator kinds to their constructors
#[derive(Clone)]
pub struct ComparatorRegistry {
    constructors: HashMap<String, ComparatorConstructor>,
}

impl ComparatorRegistry {
    /// A registry with no kinds at all
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: ComparatorConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn build(&self, kind: &str, state: &[u8]) -> Result<Arc<dyn ByteComparator>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| FilterError::UnknownComparator(kind.to_string()))?;
        constructor(state)
    }
}

fn utf8_state(state: &[u8]) -> Result<&str> {
    std::str::from_utf8(state).map_err(|e| FilterError::malformed(format!("comparator state: {e}")))
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BinaryComparator::KIND, |state| {
            Ok(Arc::new(BinaryComparator::new(state)))
        });
        registry.register(BinaryPrefixComparator::KIND, |state| {
            Ok(Arc::new(BinaryPrefixComparator::new(state)))
        });
        registry.register(SubstringComparator::KIND, |state| {
            Ok(Arc::new(SubstringComparator::new(utf8_state(state)?)))
        });
        registry.register(RegexComparator::KIND, |state| {
            Ok(Arc::new(RegexComparator::new(utf8_state(state)?)?))
        });
        registry
    }
}

impl fmt::Debug for ComparatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("ComparatorRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Scalar::Int(3), Scalar::Int(5), Ordering::Less)]
    #[case(Scalar::Long(-1), Scalar::Long(-1), Ordering::Equal)]
    #[case(Scalar::Double(f64::NAN), Scalar::Double(f64::INFINITY), Ordering::Greater)]
    #[case(Scalar::Bool(true), Scalar::Bool(false), Ordering::Greater)]
    #[case(Scalar::Bytes(vec![0x01, 0xFF]), Scalar::Bytes(vec![0x02]), Ordering::Less)]
    #[case(Scalar::Int(42), Scalar::from("42"), Ordering::Equal)]
    #[case(Scalar::Float(1.5), Scalar::from("1.5"), Ordering::Equal)]
    #[case(Scalar::from("APPLE"), Scalar::from("ORANGE"), Ordering::Less)]
    fn test_compare_to_operand(#[case] value: Scalar, #[case] operand: Scalar, #[case] expected: Ordering) {
        assert_eq!(value.compare_to_operand(&operand).unwrap(), expected);
    }

    #[test]
    fn test_mismatched_operand_is_an_error() {
        let err = Scalar::Long(5).compare_to_operand(&Scalar::Int(5)).unwrap_err();
        assert!(matches!(err, FilterError::TypeMismatch { operand: "int32", scalar: "int64" }));
    }

    #[test]
    fn test_canonical_bytes() {
        assert_eq!(Scalar::Int(1).canonical_bytes(), vec![0, 0, 0, 1]);
        assert_eq!(Scalar::Bool(true).canonical_bytes(), vec![0xFF]);
        assert_eq!(Scalar::Bool(false).canonical_bytes(), vec![0x00]);
        assert_eq!(Scalar::Double(1.0).canonical_bytes(), 1.0f64.to_bits().to_be_bytes().to_vec());
    }

    #[rstest]
    #[case(CompareOp::Less, -1, true)]
    #[case(CompareOp::Less, 0, false)]
    #[case(CompareOp::LessOrEqual, 0, true)]
    #[case(CompareOp::NotEqual, 0, false)]
    #[case(CompareOp::GreaterOrEqual, 0, true)]
    #[case(CompareOp::Greater, 7, true)]
    fn test_compare_op_accepts(#[case] op: CompareOp, #[case] result: i32, #[case] expected: bool) {
        assert_eq!(op.accepts(result), expected);
    }

    #[test]
    fn test_compare_op_accepts_ordering() {
        assert!(CompareOp::LessOrEqual.accepts_ordering(Ordering::Less));
        assert!(CompareOp::Equal.accepts_ordering(Ordering::Equal));
        assert!(!CompareOp::Greater.accepts_ordering(Ordering::Equal));
    }

    #[rstest]
    #[case(Scalar::Float(2.0), "2.0")]
    #[case(Scalar::Float(0.1), "0.1")]
    #[case(Scalar::Double(1.3), "1.3")]
    #[case(Scalar::Double(-0.0), "-0.0")]
    #[case(Scalar::Double(1e10), "1.0E10")]
    #[case(Scalar::Double(1.5e-5), "1.5E-5")]
    #[case(Scalar::Float(f32::NAN), "NaN")]
    #[case(Scalar::Double(f64::NEG_INFINITY), "-Infinity")]
    fn test_float_text(#[case] value: Scalar, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_compare_op_ordinals() {
        for ordinal in 0..6 {
            assert_eq!(CompareOp::from_ordinal(ordinal).unwrap().ordinal(), ordinal);
        }
        assert!(matches!(CompareOp::from_ordinal(6), Err(FilterError::UnknownCompareOp(6))));
    }

    #[test]
    fn test_substring_comparator_ignores_case() {
        let comparator = SubstringComparator::new("TEST");
        assert_eq!(comparator.compare_to(b"contains test contains"), 0);
        assert_eq!(comparator.compare_to(b"nothing here"), 1);
    }

    #[test]
    fn test_prefix_comparator() {
        let comparator = BinaryPrefixComparator::new(b"con".to_vec());
        assert_eq!(comparator.compare_to(b"contains"), 0);
        assert_eq!(comparator.compare_to(b"abc"), 1);
        assert_eq!(comparator.compare_to(b"co"), 1);
    }

    #[test]
    fn test_registry_rebuilds_builtins() {
        let registry = ComparatorRegistry::default();
        let original = RegexComparator::new("^con.*s$").unwrap();
        let rebuilt = registry.build(original.kind(), &original.state()).unwrap();
        assert_eq!(rebuilt.compare_to(b"contains"), 0);
        assert_eq!(rebuilt.compare_to(b"nope"), 1);
        assert!(matches!(
            registry.build("custom", b""),
            Err(FilterError::UnknownComparator(kind)) if kind == "custom"
        ));
    }
}
