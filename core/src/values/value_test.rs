use super::{Data, Value};
use crate::errors::{Error, ErrorKind};
use crate::types::Type;
use pretty_assertions::assert_eq;

fn int(i: i64) -> Value {
    Value::integer(i)
}

#[test]
fn test_type_tags() {
    assert_eq!(Value::void().ty(), Type::Void);
    assert_eq!(Value::null().ty(), Type::Null);
    assert_eq!(int(1).ty(), Type::Integer);
    assert_eq!(Value::from(1.5).ty(), Type::Decimal);
    assert_eq!(Value::from("x").ty(), Type::String);
    assert_eq!(Value::list(vec![]).ty(), Type::List);
    assert_eq!(Value::range(int(1), int(2)).ty(), Type::Range);
    assert_eq!(Value::queue().ty(), Type::Queue);
    assert_eq!(Value::failure(Error::exception("boom")).ty(), Type::Error);
}

#[test]
fn test_numbers_compare_across_types() {
    assert_eq!(int(2), Value::decimal(2.0));
    assert_eq!(int(1), Value::from("1"));
    assert_ne!(int(1), int(2));
}

#[test]
fn test_void_and_null_equality() {
    assert_eq!(Value::void(), Value::void());
    assert_ne!(Value::void(), Value::null());
    assert_eq!(Value::null(), Value::null());
    assert_ne!(Value::typed_null(Type::Integer), Value::null());
    assert_ne!(Value::void(), int(0));
    assert_ne!(Value::null(), Value::from("null"));
    assert_ne!(Value::from("null"), Value::null());
    assert_ne!(Value::void(), Value::from(""));
    assert_ne!(Value::from(""), Value::void());
}

#[test]
fn test_out_of_range_date_cast_fails() {
    let err = Value::from("9999999999999-01-01").cast(Type::Date).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCast);
}

#[test]
fn test_map_equality_ignores_order() {
    let a = Value::map_from([("x", int(1)), ("y", int(2))]);
    let b = Value::map_from([("y", int(2)), ("x", int(1))]);
    assert_eq!(a, b);
    assert_ne!(a, Value::map_from([("x", int(1))]));
}

#[test]
fn test_ordering() {
    assert!(Value::void() < Value::null());
    assert!(Value::null() < int(-100));
    assert!(int(2) < Value::decimal(2.5));
    assert!(Value::from("10") > Value::from("9"));
    assert!(Value::list(vec![int(1), int(2)]) < Value::list(vec![int(1), int(3)]));
}

#[test]
fn test_truthiness() {
    assert!(int(1).is_true());
    assert!(int(0).is_false());
    assert!(Value::from("").is_false());
    assert!(Value::void().is_false());
    assert!(Value::list(vec![int(0)]).is_true());

    let failed = Value::failure(Error::exception("boom"));
    assert!(failed.is_neither_true_nor_false());
    assert!(!failed.is_true());
    assert!(!failed.is_false());
}

#[test]
fn test_errors_ride_along() {
    let err = Error::new(ErrorKind::Timeout, "slow");
    let value = int(1).with_error(err.clone());
    assert!(value.has_errors());
    assert_eq!(value.errors(), &[err.clone()]);
    // Operations carry operand errors into their result.
    let sum = value.plus(&int(2)).unwrap();
    assert_eq!(sum, int(3));
    assert_eq!(sum.errors(), &[err.clone()]);

    let mut seen = Vec::new();
    let cleared = sum.on_errors(|e| seen.push(e.kind()));
    assert_eq!(seen, vec![ErrorKind::Timeout]);
    assert!(!cleared.has_errors());
    assert_eq!(value.into_result().unwrap_err(), err);
}

#[test]
fn test_null_and_error_absorb() {
    let failed = Value::failure(Error::exception("boom"));
    assert!(int(1).plus(&failed).unwrap().is_error());
    assert!(Value::null().multiply(&int(3)).unwrap().is_null());
}

#[test]
fn test_constraint_fingerprint_is_sticky() {
    let value = int(5).constrain("it > 0").unwrap();
    assert!(value.constraint_fingerprint().is_some());
    assert!(value.constrain("it > 0").is_ok());
    let err = value.constrain("it < 0").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(value.type_label().to_string(), format!("Integer:{}", value.meta("constraint").unwrap()));
}

#[test]
fn test_meta_once() {
    let value = int(1).with_meta_once("unit", "kg").unwrap();
    assert_eq!(value.meta("unit").as_deref(), Some("kg"));
    assert!(value.with_meta_once("unit", "kg").is_ok());
    assert!(value.with_meta_once("unit", "lb").is_err());
}

#[test]
fn test_json_round_trip_preserves_types() {
    let original = Value::map_from([
        ("n", int(1)),
        ("d", Value::decimal(2.5)),
        ("s", Value::from("text")),
        ("v", Value::void()),
        ("r", Value::range(int(1), int(3))),
        ("when", Value::date(0)),
        ("inf", Value::infinity(false)),
        ("seq", Value::sequence(vec![int(1)])),
        ("err", Value::failure(Error::new(ErrorKind::Timeout, "slow"))),
    ]);
    let text = original.to_json_string().unwrap();
    let decoded = Value::from_json_str(&text).unwrap();
    assert_eq!(decoded, original);
    assert!(decoded.get(&Value::from("seq")).unwrap().is(Type::Sequence));
    assert!(decoded.get(&Value::from("when")).unwrap().is(Type::Date));
}

#[test]
fn test_json_native_forms() {
    let value = Value::list(vec![int(1), Value::from(true), Value::null()]);
    assert_eq!(value.to_json_string().unwrap(), "[1,true,null]");
    let err = Value::from_json_str(r#"{"$type": "Nope"}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCast);
}

#[test]
fn test_data_accessors() {
    assert_eq!(int(4).as_integer(), Some(4));
    assert_eq!(Value::from("a").as_str(), Some("a"));
    assert!(matches!(Value::queue().data(), Data::Queue(_)));
    assert_eq!(Value::from("12").to_integer().unwrap(), 12);
    assert!(Value::list(vec![]).to_integer().is_err());
}

#[test]
fn test_operators_leave_operands_untouched() {
    let list = Value::list(vec![int(1), int(2)]);
    let map = Value::map_from([("a", int(1))]);
    let before = (list.to_dollar_script().unwrap(), map.to_dollar_script().unwrap());

    list.plus(&int(3)).unwrap();
    list.negate().unwrap();
    list.minus(&int(1)).unwrap();
    map.with("b", int(2)).unwrap();

    assert_eq!(
        (list.to_dollar_script().unwrap(), map.to_dollar_script().unwrap()),
        before
    );
}

#[test]
fn test_copied_queue_is_independent() {
    let queue = Value::queue();
    queue.push(&int(1)).unwrap();
    let copy = queue.copy().unwrap();

    copy.push(&int(2)).unwrap();
    assert_eq!(queue.size().unwrap(), 1);
    assert_eq!(copy.size().unwrap(), 2);

    let shared = queue.clone();
    shared.push(&int(3)).unwrap();
    assert_eq!(queue.size().unwrap(), 2);
}

#[test]
fn test_copy_recurses_and_keeps_errors_and_meta() {
    let inner = Value::queue();
    inner.push(&int(1)).unwrap();
    let doc = Value::map_from([("q", Value::list(vec![inner.clone()]))])
        .with_meta("origin", "test")
        .with_error(Error::exception("kept"));

    let copy = doc.copy().unwrap();
    assert_eq!(copy.meta("origin").as_deref(), Some("test"));
    assert!(copy.has_errors());

    let nested = copy
        .get(&Value::from("q"))
        .unwrap()
        .get(&int(0))
        .unwrap();
    nested.push(&int(2)).unwrap();
    assert_eq!(inner.size().unwrap(), 1);
    assert_eq!(nested.size().unwrap(), 2);
}
