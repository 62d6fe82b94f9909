use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use dollar::lambda::{self, ForkState};
use dollar::scope::Declaration;
use dollar::{ErrorKind, Runtime, RuntimeOptions, Value};
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

#[test]
fn volatile_variables_accept_writes_from_any_thread() {
    let runtime = runtime();
    let scope = runtime.root_scope("volatile var shared = 0");
    scope
        .declare("shared", Value::from(0), Declaration::new().volatile())
        .unwrap();
    scope.declare("local", Value::from(0), Declaration::new()).unwrap();

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            let scope = scope.clone();
            thread::spawn(move || {
                scope.set("shared", Value::from(i)).unwrap();
                scope.set("local", Value::from(i)).unwrap_err().kind()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), ErrorKind::ConcurrencyViolation);
    }

    let shared = scope.get("shared", true).unwrap().as_integer().unwrap();
    assert!((1..=4).contains(&shared));
    assert_eq!(scope.get("local", true).unwrap(), Value::from(0));
}

#[test]
fn parallel_fix_forces_each_element_once() {
    let runtime = runtime();
    let scope = runtime.root_scope("[1..64] each { base + $1 }");
    scope
        .declare("base", Value::from(100), Declaration::new().readonly())
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let items: Vec<Value> = (0..64)
        .map(|i| {
            let calls = calls.clone();
            lambda::wrap(&scope, vec![], "+", move |scope| {
                calls.fetch_add(1, Ordering::SeqCst);
                scope.get("base", true)?.plus(&Value::from(i))
            })
        })
        .collect();

    let fixed = Value::list(items.clone()).fix_deep(true).unwrap();
    let expected = Value::list((0..64).map(|i| Value::from(100 + i)).collect());
    assert_eq!(fixed, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 64);

    // Already forced: a second pass computes nothing.
    Value::list(items).fix_deep(true).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 64);
}

#[test]
fn forked_work_completes_in_the_background() {
    let runtime = runtime();
    let scope = runtime.root_scope("fork { slow() }");
    let forked = lambda::fork(&scope, "slow", |_| {
        thread::sleep(Duration::from_millis(20));
        Ok(Value::from("done"))
    })
    .unwrap();

    let value = forked.value().fix(false).unwrap();
    assert_eq!(value, Value::from("done"));
    assert_eq!(forked.fork_state(), ForkState::Completed);
}

#[test]
fn forked_work_can_time_out() {
    let runtime = runtime();
    let scope = runtime.root_scope("fork { forever() }");
    let forked = lambda::fork(&scope, "forever", |_| {
        thread::sleep(Duration::from_millis(200));
        Ok(Value::void())
    })
    .unwrap();

    let err = forked.wait_timeout(Duration::from_millis(10)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(forked.fork_state(), ForkState::NotYetAvailable);
}
