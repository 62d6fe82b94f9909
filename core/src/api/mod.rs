//! Public API for embedding the Dollar runtime.
//!
//! A host creates one [`Runtime`], asks it for root scopes, and builds
//! deferred computations over those scopes (usually from a parser's
//! output). Unhandled errors reach the host through an [`ErrorSink`].
//!
//! # Example
//!
//! ```
//! use dollar_core::api::{Runtime, RuntimeOptions};
//! use dollar_core::scope::Declaration;
//! use dollar_core::{Value, lambda};
//!
//! let runtime = Runtime::new(RuntimeOptions::default(), |_| {});
//! let scope = runtime.root_scope("var age = 44; age >= 18");
//!
//! scope.declare("age", Value::from(44), Declaration::new()).unwrap();
//! let age = lambda::variable(&scope, "age").unwrap();
//! let adult = {
//!     let age = age.clone();
//!     lambda::wrap(&scope, vec![age.clone()], ">=", move |_| {
//!         Ok(Value::from(age.compare(&Value::from(18))?.is_ge()))
//!     })
//! };
//!
//! assert_eq!(adult.fix(false).unwrap(), Value::from(true));
//! scope.set("age", Value::from(10)).unwrap();
//! assert_eq!(adult.fix(false).unwrap(), Value::from(false));
//! ```

pub mod error;
pub mod options;
pub mod runtime;

pub use error::{CollectingSink, ErrorSink, LogSink, Report};
pub use options::{Configuration, RuntimeOptions};
pub use runtime::{Runtime, ServicesBuilder};
