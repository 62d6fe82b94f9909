//! Scopes and variable records.
//!
//! Name lookup walks from a scope up through its parents to the first one
//! declaring the name. Parameters (`it`, `1`, `2`, ...) live in a separate
//! map and are looked up only in parameter scopes.
//!
//! Assignment rules, checked in this order:
//! - a pure scope cannot assign variables declared outside it
//! - readonly variables cannot be assigned
//! - non-volatile variables can only be assigned from the declaring thread
//! - a constrained variable only accepts values its constraint allows

mod frame;
mod variable;

pub use frame::Scope;
pub use variable::{Declaration, VarFlags, Variable};

#[cfg(test)]
mod scope_test;
