//! Dollar - a reactive, embeddable expression runtime
//!
//! # Overview
//!
//! Every datum a Dollar program produces is a [`Value`]. A value can be
//! concrete, deferred (a computation forced on first use), or reactive
//! (recomputed and re-announced when one of its inputs changes). Errors
//! travel as data inside values, or as `Err` when `fail_fast` is set.
//!
//! Host applications typically:
//!
//! - create one [`Runtime`] with the services they want to provide
//! - ask it for a root [`Scope`] per script
//! - build deferred computations over that scope (usually from a parser)
//! - `fix` values to read them, or `listen` to be told when they change
//!
//! # Quick Start
//!
//! ```
//! use dollar::{Runtime, RuntimeOptions, Value, lambda};
//! use dollar::scope::Declaration;
//! use std::sync::{Arc, Mutex};
//!
//! let runtime = Runtime::new(RuntimeOptions::default(), |_| {});
//! let scope = runtime.root_scope("var age = 20; age >= 18");
//! scope.declare("age", Value::from(20), Declaration::new()).unwrap();
//!
//! let age = lambda::variable(&scope, "age").unwrap();
//! let adult = {
//!     let age = age.clone();
//!     lambda::wrap(&scope, vec![age.clone()], ">=", move |_| {
//!         Ok(Value::from(age.compare(&Value::from(18))?.is_ge()))
//!     })
//! };
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let record = seen.clone();
//! adult.listen(move |value| {
//!     record.lock().unwrap().push(value.to_human_string());
//!     Ok(())
//! });
//!
//! scope.set("age", Value::from(12)).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec!["false".to_string()]);
//! ```
//!
//! # Diagnostics
//!
//! Unhandled errors reach the runtime's [`api::ErrorSink`]. [`StderrSink`]
//! renders them with source snippets; [`render_error_to_string`] does the
//! same for a single error.

pub mod error_renderer;

pub use dollar_core::api::{self, Runtime, RuntimeOptions};
pub use dollar_core::errors::{Error, ErrorKind, Result};
pub use dollar_core::lambda;
pub use dollar_core::prediction::{TypeLearner, TypePrediction};
pub use dollar_core::scope::{self, Scope};
pub use dollar_core::source::{self, SourceSegment};
pub use dollar_core::store::{self, MemoryStore, Store};
pub use dollar_core::types::{Type, TypeLabel};
pub use dollar_core::values::{self, Value};

pub use error_renderer::{
    StderrSink, render_error, render_error_to, render_error_to_string,
    render_error_to_string_no_color,
};
