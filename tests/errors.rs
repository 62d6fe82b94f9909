use std::sync::{Arc, Mutex};

use dollar::api::CollectingSink;
use dollar::scope::Declaration;
use dollar::{
    Error, ErrorKind, Runtime, RuntimeOptions, SourceSegment, Value, lambda,
    render_error_to_string_no_color,
};
use pretty_assertions::assert_eq;

const SCRIPT: &str = "var total = price * qty";

fn failing_runtime(fail_fast: bool) -> (Runtime, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let runtime = Runtime::new(
        RuntimeOptions {
            fail_fast,
            ..Default::default()
        },
        |services| {
            services.sink(sink.clone());
        },
    );
    (runtime, sink)
}

fn missing_variable(runtime: &Runtime) -> Value {
    let scope = runtime.root_scope(SCRIPT);
    lambda::LambdaBuilder::new(&scope, "*")
        .source(SourceSegment::new(SCRIPT, 12..23))
        .build(|scope| scope.get("price", true)?.multiply(&scope.get("qty", true)?))
}

#[test]
fn fail_fast_surfaces_errors_and_reports_once() {
    let (runtime, sink) = failing_runtime(true);
    let err = missing_variable(&runtime).fix(false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VariableNotFound);
    assert_eq!(sink.len(), 1);
    let report = &sink.reports()[0];
    assert_eq!(report.fragment.as_deref(), Some("price * qty"));
    assert_eq!(
        report.hash.as_deref(),
        Some(dollar::source::short_hash("price * qty").as_str())
    );

    let rendered = render_error_to_string_no_color(&err);
    assert!(rendered.contains(SCRIPT));
    assert!(rendered.contains("price"));
}

#[test]
fn errors_become_values_without_fail_fast() {
    let (runtime, sink) = failing_runtime(false);
    let value = missing_variable(&runtime).fix(false).unwrap();

    assert!(value.is_error());
    assert_eq!(value.errors()[0].kind(), ErrorKind::VariableNotFound);
    assert_eq!(sink.len(), 1);

    // Errors ride along through arithmetic.
    let sum = value.plus(&Value::from(1)).unwrap();
    assert!(sum.has_errors());
    assert!(sum.into_result().is_err());
}

#[test]
fn handlers_swallow_errors_in_their_scope() {
    let (runtime, sink) = failing_runtime(true);
    let scope = runtime.root_scope("on error { log(type, msg) }");
    let messages = Arc::new(Mutex::new(Vec::new()));
    let record = messages.clone();
    scope
        .add_error_handler(lambda::wrap(&scope, vec![], "log", move |scope| {
            let kind = scope.get_parameter("type")?;
            let msg = scope.get_parameter("msg")?;
            record.lock().unwrap().push((
                kind.as_str().unwrap_or_default().to_string(),
                msg.as_str().unwrap_or_default().to_string(),
            ));
            Ok(Value::void())
        }))
        .unwrap();

    let block = scope.sub_scope(false, "block").unwrap();
    let failing = lambda::wrap(&block, vec![], "error", |_| {
        Err(Error::exception("something broke"))
    });
    assert!(failing.fix(false).unwrap().is_void());
    assert!(sink.is_empty());
    assert_eq!(
        *messages.lock().unwrap(),
        vec![("EXCEPTION".to_string(), "something broke".to_string())]
    );
}

#[test]
fn constraints_guard_assignments() {
    let (runtime, _sink) = failing_runtime(true);
    let scope = runtime.root_scope("var<it >= 0> balance = 10");
    let non_negative = lambda::wrap(&scope, vec![], ">=", |scope| {
        let it = scope.get_parameter("it")?;
        Ok(Value::from(it.compare(&Value::from(0))?.is_ge()))
    });
    scope
        .declare(
            "balance",
            Value::from(10),
            Declaration::new().constraint(non_negative, "it >= 0"),
        )
        .unwrap();

    scope.set("balance", Value::from(0)).unwrap();
    let err = scope.set("balance", Value::from(-5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(err.message().contains("it >= 0"));
    assert_eq!(scope.get("balance", true).unwrap(), Value::from(0));
}

#[test]
fn readonly_and_purity_rules() {
    let (runtime, _sink) = failing_runtime(true);
    let scope = runtime.root_scope("const limit = 3");
    scope
        .declare("limit", Value::from(3), Declaration::new().readonly().fixed())
        .unwrap();
    scope.declare("counter", Value::from(0), Declaration::new()).unwrap();

    assert_eq!(
        scope.set("limit", Value::from(4)).unwrap_err().kind(),
        ErrorKind::Readonly
    );

    let pure = scope.sub_scope(true, "pure").unwrap();
    assert_eq!(pure.get("limit", true).unwrap(), Value::from(3));
    assert_eq!(
        pure.get("counter", true).unwrap_err().kind(),
        ErrorKind::PurityViolation
    );
}
