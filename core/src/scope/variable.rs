//! Variable records and declaration options.

use std::sync::RwLock;
use std::thread::{self, ThreadId};

use bitflags::bitflags;

use crate::sync::{read, write};
use crate::values::Value;

bitflags! {
    /// Attributes of a declared variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VarFlags: u8 {
        /// Cannot be assigned after declaration.
        const READONLY  = 1 << 0;
        /// May be assigned from any thread.
        const VOLATILE  = 1 << 1;
        /// Deep-fixed when stored.
        const FIXED     = 1 << 2;
        /// Readable from pure scopes.
        const PURE      = 1 << 3;
        const NUMERIC   = 1 << 4;
        /// A positional or implicit parameter (`1`, `it`, ...).
        const PARAMETER = 1 << 5;
    }
}

/// The mutable cell a scope keeps per declared name.
pub struct Variable {
    value: RwLock<Value>,
    constraint: Option<Value>,
    constraint_source: Option<String>,
    flags: VarFlags,
    thread: ThreadId,
}

impl Variable {
    pub(crate) fn new(value: Value, declaration: &Declaration) -> Self {
        let (constraint, constraint_source) = match &declaration.constraint {
            Some((constraint, source)) => (Some(constraint.clone()), Some(source.clone())),
            None => (None, None),
        };
        Self {
            value: RwLock::new(value),
            constraint,
            constraint_source,
            flags: declaration.flags,
            thread: thread::current().id(),
        }
    }

    pub fn value(&self) -> Value {
        read(&self.value).clone()
    }

    /// Store `value`, returning the previous one.
    pub(crate) fn replace(&self, value: Value) -> Value {
        core::mem::replace(&mut *write(&self.value), value)
    }

    pub fn flags(&self) -> VarFlags {
        self.flags
    }

    pub fn is_readonly(&self) -> bool {
        self.flags.contains(VarFlags::READONLY)
    }

    pub fn is_volatile(&self) -> bool {
        self.flags.contains(VarFlags::VOLATILE)
    }

    pub fn is_fixed(&self) -> bool {
        self.flags.contains(VarFlags::FIXED)
    }

    pub fn is_pure(&self) -> bool {
        self.flags.contains(VarFlags::PURE)
    }

    pub fn is_numeric(&self) -> bool {
        self.flags.contains(VarFlags::NUMERIC)
    }

    /// Readable from a pure scope.
    pub fn is_pure_readable(&self) -> bool {
        (self.is_readonly() && self.is_fixed()) || self.is_pure()
    }

    /// The thread that declared this variable.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn constraint(&self) -> Option<&Value> {
        self.constraint.as_ref()
    }

    pub fn constraint_source(&self) -> Option<&str> {
        self.constraint_source.as_deref()
    }
}

/// How to declare a variable.
///
/// ```ignore
/// scope.declare("limit", Value::from(10), Declaration::new().readonly().fixed())?;
/// ```
#[derive(Clone, Default)]
pub struct Declaration {
    pub flags: VarFlags,
    constraint: Option<(Value, String)>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readonly(mut self) -> Self {
        self.flags |= VarFlags::READONLY;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.flags |= VarFlags::VOLATILE;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.flags |= VarFlags::FIXED;
        self
    }

    pub fn pure(mut self) -> Self {
        self.flags |= VarFlags::PURE;
        self
    }

    pub fn numeric(mut self) -> Self {
        self.flags |= VarFlags::NUMERIC;
        self
    }

    pub(crate) fn parameter(mut self) -> Self {
        self.flags |= VarFlags::PARAMETER;
        self
    }

    /// A predicate every stored value must satisfy. It sees the new value
    /// as `it` and the one it replaces as `previous`.
    pub fn constraint(mut self, predicate: Value, source: impl Into<String>) -> Self {
        self.constraint = Some((predicate, source.into()));
        self
    }

    pub(crate) fn constraint_parts(&self) -> Option<(&Value, &str)> {
        self.constraint
            .as_ref()
            .map(|(predicate, source)| (predicate, source.as_str()))
    }
}
