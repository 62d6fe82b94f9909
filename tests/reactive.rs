use std::sync::{Arc, Mutex};

use dollar::scope::Declaration;
use dollar::{Runtime, RuntimeOptions, Scope, Type, Value, lambda};
use pretty_assertions::assert_eq;

fn runtime() -> Runtime {
    Runtime::new(
        RuntimeOptions {
            fail_fast: true,
            ..Default::default()
        },
        |_| {},
    )
}

fn compare(scope: &Scope, left: Value, right: i64) -> Value {
    let input = left.clone();
    lambda::wrap(scope, vec![left], ">=", move |_| {
        Ok(Value::from(input.compare(&Value::from(right))?.is_ge()))
    })
}

#[test]
fn is_adult_follows_age() {
    let runtime = runtime();
    let scope = runtime.root_scope("var age = 20; var isAdult = age >= 18");
    scope.declare("age", Value::from(20), Declaration::new()).unwrap();
    let age = lambda::variable(&scope, "age").unwrap();
    let is_adult = compare(&scope, age, 18);
    scope
        .declare("isAdult", is_adult.clone(), Declaration::new())
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    is_adult.listen(move |value| {
        record.lock().unwrap().push(value.to_human_string());
        Ok(())
    });

    assert_eq!(is_adult.fix(false).unwrap(), Value::from(true));
    scope.set("age", Value::from(10)).unwrap();
    scope.set("age", Value::from(30)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["false", "true"]);

    let stored = scope.get("isAdult", true).unwrap();
    assert!(stored.is_lambda());
    assert_eq!(stored.fix(false).unwrap(), Value::from(true));
}

#[test]
fn notifications_travel_down_a_chain() {
    let runtime = runtime();
    let scope = runtime.root_scope("a; b = a * 2; c = b + 1");
    scope.declare("a", Value::from(1), Declaration::new()).unwrap();
    let a = lambda::variable(&scope, "a").unwrap();
    let b = {
        let a = a.clone();
        lambda::wrap(&scope, vec![a.clone()], "*", move |_| a.multiply(&Value::from(2)))
    };
    let c = {
        let b = b.clone();
        lambda::wrap(&scope, vec![b.clone()], "+", move |_| b.plus(&Value::from(1)))
    };

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    c.listen(move |value| {
        record.lock().unwrap().push(value.clone());
        Ok(())
    });

    assert_eq!(c.fix(false).unwrap(), Value::from(3));
    scope.set("a", Value::from(5)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Value::from(11)]);
    assert_eq!(b.fix(false).unwrap(), Value::from(10));
}

#[test]
fn nested_collections_fix_on_demand() {
    let runtime = runtime();
    let scope = runtime.root_scope("{\"total\": 1 + 2, \"items\": [3 * 3]}");
    let total = lambda::wrap(&scope, vec![], "+", |_| Value::from(1).plus(&Value::from(2)));
    let product = lambda::wrap(&scope, vec![], "*", |_| Value::from(3).multiply(&Value::from(3)));
    let doc = Value::map_from([
        ("total", total.clone()),
        ("items", Value::list(vec![product.clone()])),
    ]);

    assert!(doc.fix(false).unwrap().is(Type::Map));
    assert!(total.is_pending());

    let fixed = doc.fix_deep(true).unwrap();
    assert_eq!(fixed.to_json_string().unwrap(), r#"{"items":[9],"total":3}"#);
    assert!(!product.is_pending());
}

#[test]
fn predictions_come_from_earlier_runs() {
    let runtime = runtime();
    let scope = runtime.root_scope("1 + 2");
    for _ in 0..3 {
        let sum = lambda::wrap(&scope, vec![Value::from(1), Value::from(2)], "+", |_| {
            Value::from(1).plus(&Value::from(2))
        });
        sum.fix(false).unwrap();
    }

    let pending = lambda::wrap(&scope, vec![Value::from(4), Value::from(5)], "+", |_| {
        Value::from(4).plus(&Value::from(5))
    });
    let prediction = pending.predict_type();
    assert_eq!(prediction.probable_type(), Some(Type::Integer));
    assert_eq!(prediction.probability(Type::Integer), 1.0);
    assert!(pending.is_pending());
}
