//! Constructing lambda values.

use std::sync::Arc;

use super::engine::Lambda;
use crate::errors::Result;
use crate::scope::Scope;
use crate::source::SourceSegment;
use crate::values::Value;

/// Builder for a lambda value.
///
/// # Example
///
/// ```ignore
/// let total = LambdaBuilder::new(&scope, "+")
///     .source(segment)
///     .inputs(vec![a.clone(), b.clone()])
///     .build(move |_| a.plus(&b));
/// ```
pub struct LambdaBuilder {
    scope: Scope,
    operation: String,
    source: SourceSegment,
    inputs: Vec<Value>,
    fixable: bool,
}

impl LambdaBuilder {
    pub fn new(scope: &Scope, operation: impl Into<String>) -> Self {
        Self {
            scope: scope.clone(),
            operation: operation.into(),
            source: scope.source().clone(),
            inputs: Vec::new(),
            fixable: true,
        }
    }

    /// The expression text this lambda was built from. Defaults to the
    /// scope's source.
    pub fn source(mut self, source: SourceSegment) -> Self {
        self.source = source;
        self
    }

    pub fn inputs(mut self, inputs: Vec<Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.inputs.push(input);
        self
    }

    /// Never cache: every force re-evaluates and `fix` returns the lambda
    /// itself.
    pub fn unfixable(mut self) -> Self {
        self.fixable = false;
        self
    }

    /// Create the lambda and subscribe it to every lambda among its inputs.
    pub fn build(
        self,
        compute: impl Fn(&Scope) -> Result<Value> + Send + Sync + 'static,
    ) -> Value {
        let lambda = Lambda::new(
            self.scope,
            self.source,
            self.operation,
            self.inputs,
            Arc::new(compute),
            self.fixable,
        );
        for input in lambda.inputs() {
            if let Some(source) = input.as_lambda() {
                source.add_dependent(&lambda);
            }
        }
        Value::from_lambda(lambda)
    }
}

/// Wrap `compute` as a reactive lambda over `inputs`.
///
/// Any of the inputs notifying invalidates the result and re-notifies the
/// returned value's own listeners.
pub fn wrap(
    scope: &Scope,
    inputs: Vec<Value>,
    operation: &str,
    compute: impl Fn(&Scope) -> Result<Value> + Send + Sync + 'static,
) -> Value {
    LambdaBuilder::new(scope, operation).inputs(inputs).build(compute)
}

/// Like [`wrap`], for a computation that must run on every access.
pub fn wrap_unfixable(
    scope: &Scope,
    inputs: Vec<Value>,
    operation: &str,
    compute: impl Fn(&Scope) -> Result<Value> + Send + Sync + 'static,
) -> Value {
    LambdaBuilder::new(scope, operation)
        .inputs(inputs)
        .unfixable()
        .build(compute)
}

/// A reference to the variable `name`, resolved when forced and notified
/// whenever the variable is assigned.
pub fn variable(scope: &Scope, name: &str) -> Result<Value> {
    let key = name.to_string();
    let value = LambdaBuilder::new(scope, "variable").build(move |scope| scope.get(&key, true));
    scope.listen(name, &value)?;
    Ok(value)
}
