use std::sync::{Arc, Mutex};
use std::thread;

use pretty_assertions::assert_eq;

use super::{Declaration, Scope};
use crate::api::{CollectingSink, Runtime, RuntimeOptions};
use crate::errors::{Error, ErrorKind};
use crate::lambda::{LambdaBuilder, wrap};
use crate::source::{SourceSegment, short_hash};
use crate::test_utils::{fail_fast_runtime, init_test_logging};
use crate::values::Value;

fn root() -> Scope {
    fail_fast_runtime().root_scope("test")
}

/// `it > 0`, written the way a parser would build it.
fn positive(scope: &Scope) -> Value {
    wrap(scope, vec![], ">", |scope| {
        let it = scope.get_parameter("it")?;
        Ok(Value::boolean(it.compare(&Value::from(0))?.is_gt()))
    })
}

#[test]
fn test_declare_get_set() {
    let scope = root();
    scope.declare("x", Value::from(1), Declaration::new()).unwrap();
    assert_eq!(scope.get("x", true).unwrap(), Value::from(1));
    scope.set("x", Value::from(2)).unwrap();
    assert_eq!(scope.get("x", true).unwrap(), Value::from(2));
}

#[test]
fn test_missing_variable() {
    let scope = root();
    assert!(scope.get("nope", false).unwrap().is_void());
    let err = scope.get("nope", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VariableNotFound);
}

#[test]
fn test_set_finds_owning_scope() {
    let scope = root();
    scope.declare("x", Value::from(1), Declaration::new()).unwrap();
    let child = scope.sub_scope(false, "block").unwrap();
    child.set("x", Value::from(5)).unwrap();
    assert_eq!(scope.get("x", true).unwrap(), Value::from(5));

    // Undeclared names are declared where they are set.
    child.set("local", Value::from(1)).unwrap();
    assert!(child.has("local"));
    assert!(!scope.has("local"));
    assert!(child.has_parent(&scope));
    assert!(!scope.has_parent(&child));
}

#[test]
fn test_readonly() {
    let scope = root();
    scope
        .declare("x", Value::from(1), Declaration::new().readonly())
        .unwrap();
    let err = scope.set("x", Value::from(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Readonly);
    let err = scope
        .declare("x", Value::from(3), Declaration::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Readonly);
    assert_eq!(scope.get("x", true).unwrap(), Value::from(1));
}

#[test]
fn test_thread_ownership() {
    init_test_logging();
    let scope = root();
    scope.declare("owned", Value::from(1), Declaration::new()).unwrap();
    scope
        .declare("shared", Value::from(1), Declaration::new().volatile())
        .unwrap();

    let remote = scope.clone();
    let (owned, shared) = thread::spawn(move || {
        (
            remote.set("owned", Value::from(2)),
            remote.set("shared", Value::from(2)),
        )
    })
    .join()
    .unwrap();

    assert_eq!(owned.unwrap_err().kind(), ErrorKind::ConcurrencyViolation);
    assert_eq!(shared.unwrap(), Value::from(2));
    assert_eq!(scope.get("owned", true).unwrap(), Value::from(1));
    assert_eq!(scope.get("shared", true).unwrap(), Value::from(2));
}

#[test]
fn test_pure_scope_reads() {
    let scope = root();
    scope.declare("mutable", Value::from(1), Declaration::new()).unwrap();
    scope
        .declare("constant", Value::from(2), Declaration::new().readonly().fixed())
        .unwrap();
    scope
        .declare("marked", Value::from(3), Declaration::new().pure())
        .unwrap();

    let pure = scope.sub_scope(true, "pure").unwrap();
    let err = pure.get("mutable", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PurityViolation);
    assert_eq!(pure.get("constant", true).unwrap(), Value::from(2));
    assert_eq!(pure.get("marked", true).unwrap(), Value::from(3));

    // Its own declarations are pure.
    pure.declare("inner", Value::from(4), Declaration::new()).unwrap();
    assert_eq!(pure.get("inner", true).unwrap(), Value::from(4));
}

#[test]
fn test_pure_scope_writes() {
    let scope = root();
    scope.declare("mutable", Value::from(1), Declaration::new()).unwrap();
    let pure = scope.sub_scope(true, "pure").unwrap();

    let err = pure
        .declare("v", Value::from(1), Declaration::new().volatile())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PurityViolation);

    let err = pure.set("mutable", Value::from(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PurityViolation);

    let err = pure.sub_scope(false, "impure").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PurityViolation);

    let err = pure.clear().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PurityViolation);
}

#[test]
fn test_constraint_rejects_and_accepts() {
    let scope = root();
    let err = scope
        .declare(
            "x",
            Value::from(-1),
            Declaration::new().constraint(positive(&scope), "it > 0"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(!scope.has("x"));

    scope
        .declare(
            "x",
            Value::from(5),
            Declaration::new().constraint(positive(&scope), "it > 0"),
        )
        .unwrap();
    assert_eq!(scope.constraint_source("x").as_deref(), Some("it > 0"));

    // Same constraint again: accepted.
    scope
        .declare(
            "x",
            Value::from(6),
            Declaration::new().constraint(positive(&scope), "it > 0"),
        )
        .unwrap();

    // A different constraint: rejected.
    let err = scope
        .declare(
            "x",
            Value::from(7),
            Declaration::new().constraint(positive(&scope), "it >= 0"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    // Assignments are checked too.
    let err = scope.set("x", Value::from(-3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    let stored = scope.set("x", Value::from(8)).unwrap();
    assert_eq!(stored, Value::from(8));
    assert_eq!(stored.constraint_fingerprint(), Some(short_hash("it > 0")));
}

#[test]
fn test_constraint_sees_previous() {
    let scope = root();
    let increasing = wrap(&scope, vec![], ">=", |scope| {
        let it = scope.get_parameter("it")?;
        let previous = scope.get_parameter("previous")?;
        Ok(Value::boolean(it.compare(&previous)?.is_ge()))
    });
    scope
        .declare(
            "counter",
            Value::from(1),
            Declaration::new().constraint(increasing, "it >= previous"),
        )
        .unwrap();
    scope.set("counter", Value::from(5)).unwrap();
    let err = scope.set("counter", Value::from(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(scope.get("counter", true).unwrap(), Value::from(5));
}

#[test]
fn test_fixed_declaration_stores_concrete_value() {
    let scope = root();
    let lazy = wrap(&scope, vec![], "+", |_| Value::from(1).plus(&Value::from(2)));
    let stored = scope
        .declare("sum", lazy, Declaration::new().fixed())
        .unwrap();
    assert!(!stored.is_lambda());
    assert_eq!(stored, Value::from(3));
}

#[test]
fn test_numeric_variables() {
    let scope = root();
    let err = scope
        .declare("n", Value::from("text"), Declaration::new().numeric())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCast);
    scope
        .declare("n", Value::from(1.5), Declaration::new().numeric())
        .unwrap();
}

#[test]
fn test_parameters() {
    let scope = root();
    let call = scope.sub_scope(false, "call").unwrap();
    call.parameter("1", Value::from("a")).unwrap();
    call.parameter("2", Value::from("b")).unwrap();
    call.parameter("it", Value::from("a")).unwrap();
    assert!(call.is_parameter_scope());
    assert_eq!(call.parameters(), vec![Value::from("a"), Value::from("b")]);
    assert_eq!(call.get("1", true).unwrap(), Value::from("a"));

    let err = call.parameter("1", Value::from("z")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);

    // A plain block sees the enclosing parameters.
    let block = call.sub_scope(false, "block").unwrap();
    assert_eq!(block.get_parameter("2").unwrap(), Value::from("b"));

    // Positional lookups stop at the nearest parameter scope.
    let inner = call.sub_scope(false, "inner-call").unwrap();
    inner.parameter("it", Value::from("c")).unwrap();
    assert!(inner.get_parameter("1").unwrap().is_void());
    assert_eq!(inner.get_parameter("it").unwrap(), Value::from("c"));
    assert_eq!(inner.get("it", true).unwrap(), Value::from("c"));
}

#[test]
fn test_positional_names_are_not_variables() {
    let scope = root();
    let err = scope
        .declare("1", Value::from(1), Declaration::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);
    let err = scope.set("2", Value::from(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);
}

#[test]
fn test_error_handler_sees_type_and_msg() {
    let scope = root();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let handler = wrap(&scope, vec![], "handler", move |scope| {
        let kind = scope.get_parameter("type")?;
        let msg = scope.get_parameter("msg")?;
        record.lock().unwrap().push(format!(
            "{}:{}",
            kind.as_str().unwrap_or_default(),
            msg.as_str().unwrap_or_default()
        ));
        Ok(Value::void())
    });
    scope.add_error_handler(handler).unwrap();

    let failing = wrap(&scope, vec![], "boom", |_| Err(Error::exception("boom")));
    let value = failing.fix(false).unwrap();
    assert!(value.is_void());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![format!("{}:boom", ErrorKind::Exception.name())]
    );
}

#[test]
fn test_errors_bubble_to_parent_handler() {
    let scope = root();
    let handled = Arc::new(Mutex::new(0));
    let counter = handled.clone();
    scope
        .add_error_handler(wrap(&scope, vec![], "handler", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(Value::void())
        }))
        .unwrap();
    let child = scope.sub_scope(false, "child").unwrap();
    let failing = wrap(&child, vec![], "boom", |_| Err(Error::exception("boom")));
    assert!(failing.fix(false).unwrap().is_void());
    assert_eq!(*handled.lock().unwrap(), 1);
}

#[test]
fn test_fail_fast_reports_once() {
    let sink = Arc::new(CollectingSink::new());
    let runtime = Runtime::new(
        RuntimeOptions {
            fail_fast: true,
            ..Default::default()
        },
        |services| {
            services.sink(sink.clone());
        },
    );
    let text = "1 / boom";
    let scope = runtime.root_scope(text);
    let failing = LambdaBuilder::new(&scope, "/")
        .source(SourceSegment::new(text, 4..8))
        .build(|_| Err(Error::exception("boom")));

    let err = failing.fix(false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exception);
    assert_eq!(sink.len(), 1);
    let report = &sink.reports()[0];
    assert_eq!(report.fragment.as_deref(), Some("boom"));
    assert_eq!(report.hash, Some(short_hash("boom")));
}

#[test]
fn test_without_fail_fast_errors_become_values() {
    let sink = Arc::new(CollectingSink::new());
    let runtime = Runtime::new(RuntimeOptions::default(), |services| {
        services.sink(sink.clone());
    });
    let scope = runtime.root_scope("boom");
    let failing = wrap(&scope, vec![], "boom", |_| Err(Error::exception("boom")));
    let value = failing.fix(false).unwrap();
    assert!(value.is_error());
    assert!(value.has_errors());
    assert_eq!(sink.len(), 1);

    // Toggling the live flag switches behaviour for the same runtime.
    runtime.config().set_fail_fast(true);
    let again = wrap(&scope, vec![], "boom", |_| Err(Error::exception("boom")));
    assert!(again.fix(false).is_err());
}

#[test]
fn test_assertions_skip_handlers() {
    let scope = root();
    scope
        .add_error_handler(wrap(&scope, vec![], "handler", |_| Ok(Value::void())))
        .unwrap();
    let err = scope.handle_error(Error::assertion("broken")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);
}

#[test]
fn test_copy_and_destroy() {
    let scope = root();
    scope.declare("x", Value::from(1), Declaration::new()).unwrap();
    let copy = scope.copy().unwrap();
    assert_eq!(copy.get("x", true).unwrap(), Value::from(1));
    copy.declare("y", Value::from(2), Declaration::new()).unwrap();
    assert!(!scope.has("y"));

    copy.destroy();
    assert!(copy.is_destroyed());
    let err = copy.get("x", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);
    // The original is untouched.
    assert_eq!(scope.get("x", true).unwrap(), Value::from(1));
}

#[test]
fn test_clear() {
    let scope = root();
    scope.declare("x", Value::from(1), Declaration::new()).unwrap();
    scope.clear().unwrap();
    assert!(!scope.has("x"));
}
