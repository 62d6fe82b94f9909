//! Core runtime for the Dollar expression language.
//!
//! The pieces a parser or host needs to evaluate Dollar programs live here:
//! dynamically typed [`values::Value`]s, deferred computations
//! ([`lambda`]), lexical [`scope::Scope`]s with reactive notification,
//! a learned [`prediction::TypeLearner`], and the [`api::Runtime`] that ties
//! configuration and host services together.

pub mod api;
pub mod casting;
pub mod errors;
pub mod lambda;
pub mod prediction;
pub mod scope;
pub mod source;
pub mod store;
pub mod types;
pub mod values;

pub(crate) mod sync;

pub use api::{Runtime, RuntimeOptions};
pub use errors::{Error, ErrorKind, Result};
pub use scope::Scope;
pub use source::SourceSegment;
pub use types::Type;
pub use values::Value;
