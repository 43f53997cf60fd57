//! Column predicates evaluated against `ExampleProto` cell values

mod common;

use std::sync::Arc;

use common::*;
use proptest::prelude::*;
use proto_filter::compare::{BinaryPrefixComparator, RegexComparator, SubstringComparator};
use proto_filter::{
    ColumnPredicate, CompareOp, ComparatorRegistry, FilterError, MatchOp, ReturnCode, RowFilter, RowState, Scalar,
    SchemaCache,
};
use rstest::rstest;

fn evaluate(predicate: &ColumnPredicate, message: &ExampleProto) -> bool {
    let cache = SchemaCache::default();
    let mut evaluator = predicate.evaluator(&cache).unwrap();
    run_row(&mut evaluator, &cell(message))
}

#[rstest]
#[case("id", CompareOp::Equal, Scalar::Long(2), true)]
#[case("id", CompareOp::Greater, Scalar::Long(1), true)]
#[case("id", CompareOp::Less, Scalar::Long(2), false)]
#[case("id", CompareOp::LessOrEqual, Scalar::Long(2), true)]
#[case("portal_id", CompareOp::GreaterOrEqual, Scalar::Int(7), true)]
#[case("portal_id", CompareOp::NotEqual, Scalar::Int(7), false)]
#[case("portal_id", CompareOp::Equal, Scalar::from("7"), true)]
#[case("name", CompareOp::Equal, Scalar::from("name"), false)]
#[case("name", CompareOp::NotEqual, Scalar::from(""), true)]
#[case("name", CompareOp::Greater, Scalar::from("b"), true)]
#[case("bool_test", CompareOp::Equal, Scalar::Bool(true), true)]
#[case("bool_test", CompareOp::Less, Scalar::Bool(true), false)]
#[case("float_test", CompareOp::Equal, Scalar::Float(1.3), true)]
#[case("float_test", CompareOp::Less, Scalar::Float(f32::NAN), true)]
#[case("float_test", CompareOp::Equal, Scalar::from("1.3"), true)]
#[case("double_test", CompareOp::Less, Scalar::Double(3.0), true)]
#[case("double_test", CompareOp::Equal, Scalar::from("2.5"), true)]
#[case("bytes_test", CompareOp::Equal, Scalar::Bytes(b"abc".to_vec()), true)]
#[case("bytes_test", CompareOp::Greater, Scalar::Bytes(b"abb".to_vec()), true)]
#[case("test_enum", CompareOp::Equal, Scalar::from("ORANGE"), true)]
#[case("test_enum", CompareOp::Equal, Scalar::from("APPLE"), false)]
#[case("child_proto.child_proto_val", CompareOp::Greater, Scalar::Int(4), true)]
#[case(".child_proto.child_proto_val", CompareOp::Equal, Scalar::Int(5), true)]
fn test_scalar_comparisons(
    #[case] field_spec: &str,
    #[case] op: CompareOp,
    #[case] operand: Scalar,
    #[case] expected: bool,
) {
    let predicate = registry()
        .for_column::<ExampleProto>(FAMILY, QUALIFIER)
        .unwrap()
        .field_compare(field_spec, op, operand);
    assert_eq!(evaluate(&predicate, &sample()), expected);
}

#[test]
fn test_required_and_name_fields() {
    let registry = registry();
    let message = ExampleProto {
        required_test: Some(1),
        name: Some("contains test contains".to_string()),
        ..Default::default()
    };
    let builder = registry.for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();

    assert!(!evaluate(&builder.clone().field_eq("name", "name"), &message));
    assert!(evaluate(&builder.clone().field_ne("name", ""), &message));
    assert!(evaluate(&builder.field_eq("required_test", 1i32), &message));
}

#[test]
fn test_declared_default_applies_to_absent_field() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let message = with_id(3);

    assert!(evaluate(&builder.clone().field_eq("default_test", 5i32), &message));
    assert!(!evaluate(&builder.clone().field_eq("default_test", 4i32), &message));

    let explicit = ExampleProto {
        default_test: Some(4),
        ..with_id(3)
    };
    assert!(evaluate(&builder.field_eq("default_test", 4i32), &explicit));
}

#[test]
fn test_absent_nested_message_is_absent() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let message = with_id(3);

    assert!(!evaluate(&builder.clone().field_gt("child_proto.child_proto_val", 0i32), &message));
    assert!(evaluate(&builder.field_ne("child_proto.child_proto_val", 0i32), &message));
}

#[test]
fn test_absent_repeated_field_is_absent() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let message = with_id(1);

    assert!(evaluate(&builder.clone().field_ne("tags", "x"), &message));
    assert!(!evaluate(&builder.field_eq("tags", "x"), &message));
}

#[test]
fn test_whole_floats_compare_as_text() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let message = ExampleProto {
        float_test: Some(2.0),
        double_test: Some(1e10),
        ..with_id(1)
    };

    assert!(evaluate(&builder.clone().field_eq("float_test", "2.0"), &message));
    assert!(!evaluate(&builder.clone().field_eq("float_test", "2"), &message));
    assert!(evaluate(&builder.field_eq("double_test", "1.0E10"), &message));
}

fn compare_op() -> impl Strategy<Value = CompareOp> {
    prop::sample::select(vec![
        CompareOp::Less,
        CompareOp::LessOrEqual,
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::GreaterOrEqual,
        CompareOp::Greater,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_absent_field_only_passes_not_equal(op in compare_op(), operand in any::<i32>(), id in any::<i64>()) {
        let predicate = registry()
            .for_column::<ExampleProto>(FAMILY, QUALIFIER)
            .unwrap()
            .field_compare("portal_id", op, operand);
        prop_assert_eq!(evaluate(&predicate, &with_id(id)), op == CompareOp::NotEqual);
    }
}

#[rstest]
#[case(MatchOp::Any, true)]
#[case(MatchOp::None, false)]
#[case(MatchOp::Exact, false)]
#[case(MatchOp::NotExact, true)]
#[case(MatchOp::Equal, false)]
#[case(MatchOp::NotEqual, true)]
fn test_message_match_with_partial_overlap(#[case] op: MatchOp, #[case] expected: bool) {
    let operand = ExampleProto {
        required_test: Some(4),
        name: Some("contains test contains".to_string()),
        ..Default::default()
    };
    let value = ExampleProto {
        required_test: Some(1),
        name: Some("contains test contains".to_string()),
        float_test: Some(1.3),
        ..Default::default()
    };
    let predicate = registry()
        .for_column::<ExampleProto>(FAMILY, QUALIFIER)
        .unwrap()
        .message_match(op, prost::Message::encode_to_vec(&operand));
    assert_eq!(evaluate(&predicate, &value), expected);
}

#[test]
fn test_message_match_terminals() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let value = ExampleProto {
        required_test: Some(1),
        name: Some("contains test contains".to_string()),
        float_test: Some(1.3),
        child_proto: Some(ChildProto {
            child_proto_val: Some(9),
        }),
        ..Default::default()
    };
    let subset = ExampleProto {
        required_test: Some(1),
        name: Some("contains test contains".to_string()),
        ..Default::default()
    };
    let other_child = ExampleProto {
        child_proto: Some(ChildProto {
            child_proto_val: Some(8),
        }),
        ..Default::default()
    };

    assert!(evaluate(&builder.clone().containing_fields_matched(&subset), &value));
    assert!(!evaluate(&builder.clone().containing_fields_not_matched(&subset), &value));
    assert!(!evaluate(&builder.clone().is_equal_to(&subset), &value));
    assert!(evaluate(&builder.clone().is_equal_to(&value), &value));
    assert!(evaluate(&builder.clone().is_not_equal_to(&subset), &value));
    assert!(evaluate(&builder.clone().no_fields_matched(&other_child), &value));
    assert!(!evaluate(&builder.any_fields_matched(&other_child), &value));
}

#[rstest]
#[case("test", true)]
#[case("TEST", true)]
#[case("not", false)]
fn test_substring_comparator(#[case] needle: &str, #[case] expected: bool) {
    let predicate = registry()
        .for_column::<ExampleProto>(FAMILY, QUALIFIER)
        .unwrap()
        .field_byte_comparable("name", Arc::new(SubstringComparator::new(needle)), CompareOp::Equal);
    assert_eq!(evaluate(&predicate, &sample()), expected);

    let decoded = ColumnPredicate::from_bytes(&predicate.to_bytes(), &ComparatorRegistry::default()).unwrap();
    assert_eq!(evaluate(&decoded, &sample()), expected);
}

#[test]
fn test_other_byte_comparators() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();

    let regex = builder.clone().field_byte_comparable(
        "name",
        Arc::new(RegexComparator::new("^contains .* contains$").unwrap()),
        CompareOp::Equal,
    );
    assert!(evaluate(&regex, &sample()));

    // id 2 is eight big-endian bytes ending in 0x02
    let prefix = builder.field_byte_comparable(
        "id",
        Arc::new(BinaryPrefixComparator::new(vec![0u8, 0, 0])),
        CompareOp::Equal,
    );
    assert!(evaluate(&prefix, &sample()));
}

#[test]
fn test_round_trip_evaluates_identically() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let predicates = [
        builder.clone().field_eq("id", 2i64),
        builder.clone().filter_if_missing(true).field_lt("double_test", 1.0f64),
        builder.clone().latest_version_only(false).field_eq("test_enum", "ORANGE"),
        builder.clone().field_eq("bytes_test", b"abc".to_vec()),
        builder.any_fields_matched(&with_id(2)),
    ];
    let rows = [sample(), with_id(2), with_id(9)];

    for predicate in &predicates {
        let decoded = ColumnPredicate::from_bytes(&predicate.to_bytes(), &ComparatorRegistry::default()).unwrap();
        assert_eq!(&decoded, predicate);
        for row in &rows {
            assert_eq!(evaluate(&decoded, row), evaluate(predicate, row), "{:?}", predicate);
        }
    }
}

#[test]
fn test_latest_version_only_decides_on_first_value() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let cache = SchemaCache::default();
    let versions = vec![
        (FAMILY, QUALIFIER, prost::Message::encode_to_vec(&with_id(1))),
        (FAMILY, QUALIFIER, prost::Message::encode_to_vec(&with_id(2))),
    ];

    let mut latest = builder.clone().field_eq("id", 2i64).evaluator(&cache).unwrap();
    latest.reset();
    assert_eq!(latest.on_value(FAMILY, QUALIFIER, &versions[0].2).unwrap(), ReturnCode::SkipRow);
    assert_eq!(latest.state(), RowState::FoundUnmatched);
    assert!(!latest.row_verdict());

    let mut any_version = builder.latest_version_only(false).field_eq("id", 2i64).evaluator(&cache).unwrap();
    assert!(run_row(&mut any_version, &versions));
    assert_eq!(any_version.state(), RowState::FoundMatched);

    any_version.reset();
    assert_eq!(any_version.state(), RowState::NotFound);
}

#[test]
fn test_missing_column_and_other_columns() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let cache = SchemaCache::default();
    let unrelated: Vec<(&[u8], &[u8], Vec<u8>)> = vec![(FAMILY, &b"other"[..], b"not a message".to_vec())];

    let mut lenient = builder.clone().field_eq("id", 2i64).evaluator(&cache).unwrap();
    assert_eq!(lenient.on_value(FAMILY, b"other", b"junk").unwrap(), ReturnCode::Include);
    assert!(run_row(&mut lenient, &unrelated));

    let mut strict = builder.filter_if_missing(true).field_eq("id", 2i64).evaluator(&cache).unwrap();
    assert!(!run_row(&mut strict, &unrelated));
    assert!(run_row(&mut strict, &cell(&with_id(2))));
}

#[test]
fn test_usage_errors() {
    let builder = registry().for_column::<ExampleProto>(FAMILY, QUALIFIER).unwrap();
    let cache = SchemaCache::default();
    let message = ExampleProto {
        tags: vec!["a".to_string()],
        ..sample()
    };
    let bytes = prost::Message::encode_to_vec(&message);

    let on_message = builder.clone().field_eq("child_proto", 5i32).evaluator(&cache).unwrap();
    assert!(matches!(
        on_message.matches(&bytes).unwrap_err(),
        FilterError::PathEndsOnMessage { .. }
    ));

    let repeated = builder.clone().field_eq("tags", "a").evaluator(&cache).unwrap();
    assert!(matches!(repeated.matches(&bytes).unwrap_err(), FilterError::RepeatedField { .. }));

    let mismatched = builder.clone().field_eq("id", 2i32).evaluator(&cache).unwrap();
    assert!(matches!(mismatched.matches(&bytes).unwrap_err(), FilterError::TypeMismatch { .. }));

    let truncated = builder.field_eq("id", 2i64).evaluator(&cache).unwrap();
    assert!(truncated.matches(&bytes[..bytes.len() - 1]).is_err());
}
