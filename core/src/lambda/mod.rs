//! The lazy/reactive engine.
//!
//! A lambda value wraps a computation over a [`Scope`](crate::Scope). It is
//! forced on first use and cached until one of its inputs notifies it.
//! A notification is a single pass over everything that depends on it:
//!
//! ```text
//! scope.set("age", 10)
//!   -> collect variable("age") and (age >= 18)
//!   -> clear both caches
//!   -> run each one's listener callbacks once, with the new value
//! ```
//!
//! Dependency edges are weak: dropping a lambda value unsubscribes it.

mod builder;
mod engine;
mod fix;
mod fork;
mod guard;

pub use builder::{LambdaBuilder, variable, wrap, wrap_unfixable};
pub use engine::{Callback, Compute, Lambda};
pub use fork::{ForkState, Forked, fork};
