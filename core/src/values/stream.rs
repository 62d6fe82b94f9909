//! Stream resources and the read/write matrix.
//!
//! Reads and writes are parameterised by two independent flags:
//!
//! | read        | non-mutating | mutating |
//! |-------------|--------------|----------|
//! | non-blocking| peek         | poll     |
//! | blocking    | read         | pop      |
//!
//! Writes follow the same matrix: a mutating write enqueues, a
//! non-mutating write publishes to subscribers without enqueueing.

use std::sync::Arc;
use std::time::Duration;

use super::value::{Data, Value};
use crate::errors::{Error, ErrorKind, Result};

/// Callback receiving each value written to a stream.
pub type Subscriber = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// A readable and writable resource behind a queue or URI value.
pub trait StreamResource: Send + Sync {
    fn read(&self, blocking: bool, mutating: bool) -> Result<Value>;

    /// A blocking read that gives up after `timeout`, yielding void.
    fn read_timeout(&self, timeout: Duration, mutating: bool) -> Result<Value> {
        let _ = timeout;
        self.read(true, mutating)
    }

    fn write(&self, value: Value, blocking: bool, mutating: bool) -> Result<Value>;

    fn subscribe(&self, subscriber: Subscriber) -> Result<String> {
        let _ = subscriber;
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "This resource does not support subscriptions",
        ))
    }

    fn unsubscribe(&self, id: &str) -> Result<bool> {
        let _ = id;
        Ok(false)
    }

    /// Remove and return everything currently available.
    fn drain(&self) -> Result<Vec<Value>> {
        Err(Error::new(ErrorKind::InvalidOperation, "This resource cannot be drained"))
    }

    /// Everything currently available, without removing it.
    fn all(&self) -> Result<Vec<Value>> {
        Err(Error::new(ErrorKind::InvalidOperation, "This resource cannot be listed"))
    }

    fn size(&self) -> Result<usize> {
        Err(Error::new(ErrorKind::InvalidOperation, "This resource has no size"))
    }
}

impl Value {
    fn stream(&self) -> Result<Option<Arc<dyn StreamResource>>> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Queue(queue) => Some(queue.clone() as Arc<dyn StreamResource>),
            Data::Uri(uri) => Some(uri.resource()?.clone()),
            _ => None,
        })
    }

    fn require_stream(&self, operation: &str) -> Result<Arc<dyn StreamResource>> {
        self.stream()?
            .ok_or_else(|| Error::invalid_operation(operation, self.ty()))
    }

    /// Read under the blocking/mutating matrix. Plain values read as themselves.
    pub fn read(&self, blocking: bool, mutating: bool) -> Result<Value> {
        match self.stream()? {
            Some(stream) => stream.read(blocking, mutating),
            None => self.forced(),
        }
    }

    /// Write under the blocking/mutating matrix. The value is fully
    /// resolved before it is written.
    pub fn write(&self, value: &Value, blocking: bool, mutating: bool) -> Result<Value> {
        let stream = self.require_stream("write")?;
        stream.write(value.fix_deep(false)?, blocking, mutating)
    }

    /// Non-blocking, non-mutating read.
    pub fn peek(&self) -> Result<Value> {
        self.read(false, false)
    }

    /// Non-blocking, mutating read.
    pub fn poll(&self) -> Result<Value> {
        self.read(false, true)
    }

    /// Blocking, mutating read.
    pub fn pop(&self) -> Result<Value> {
        self.read(true, true)
    }

    /// Blocking, mutating read that yields void after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Value> {
        self.require_stream("pop")?.read_timeout(timeout, true)
    }

    /// Mutating write: enqueue.
    pub fn push(&self, value: &Value) -> Result<Value> {
        self.write(value, false, true)
    }

    /// Non-mutating write: deliver to subscribers only.
    pub fn publish(&self, value: &Value) -> Result<Value> {
        self.write(value, false, false)
    }

    pub fn subscribe(
        &self,
        subscriber: impl Fn(&Value) -> Result<()> + Send + Sync + 'static,
    ) -> Result<String> {
        self.require_stream("subscribe")?.subscribe(Arc::new(subscriber))
    }

    pub fn unsubscribe(&self, id: &str) -> Result<bool> {
        self.require_stream("unsubscribe")?.unsubscribe(id)
    }

    pub fn drain(&self) -> Result<Value> {
        Ok(Value::list(self.require_stream("drain")?.drain()?))
    }

    pub fn all(&self) -> Result<Value> {
        Ok(Value::list(self.require_stream("all")?.all()?))
    }
}
